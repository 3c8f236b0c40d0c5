//! Test helpers for platoon coordination.
//!
//! Georeference doubles and builders for transport records, shared by the
//! unit tests of the coordination crate and the simulation scenarios.

use platoon_core::{GeoError, Georeference};
use platoon_messages::{
    wire, CoordinationMessage, InfoParams, JoinParams, MobilityHeader, MobilityOperation,
    MobilityRequest, MobilityResponse, RawMessage, RawOperation, StatusParams,
};
use platoon_types::{EcefPoint, PlanId, PlatoonId, RoutePosition, VehicleId};

// ═══════════════════════════════════════════════════════════════════════════
// Georeferences
// ═══════════════════════════════════════════════════════════════════════════

/// Straight route along the x axis: `x` is downtrack, `y` is crosstrack.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearGeoreference;

impl Georeference for LinearGeoreference {
    fn to_route(&self, point: &EcefPoint) -> Result<RoutePosition, GeoError> {
        if !point.is_finite() {
            return Err(GeoError::InvalidArgument(format!("{:?}", point)));
        }
        Ok(RoutePosition::new(point.x, point.y))
    }

    fn to_ecef(&self, position: &RoutePosition) -> Result<EcefPoint, GeoError> {
        Ok(EcefPoint::new(position.downtrack, position.crosstrack, 0.0))
    }
}

/// Georeference with no map loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingGeoreference;

impl Georeference for FailingGeoreference {
    fn to_route(&self, _point: &EcefPoint) -> Result<RoutePosition, GeoError> {
        Err(GeoError::NoReference)
    }

    fn to_ecef(&self, _position: &RoutePosition) -> Result<EcefPoint, GeoError> {
        Err(GeoError::NoReference)
    }
}

/// Location on the [`LinearGeoreference`] route.
pub fn location(downtrack: f64, crosstrack: f64) -> EcefPoint {
    EcefPoint::new(downtrack, crosstrack, 0.0)
}

// ═══════════════════════════════════════════════════════════════════════════
// Transport records
// ═══════════════════════════════════════════════════════════════════════════

fn id(s: &str) -> VehicleId {
    VehicleId::from(s)
}

fn raw(message: CoordinationMessage) -> RawMessage {
    wire::encode(&message)
}

/// STATUS broadcast.
pub fn raw_status(
    sender: &str,
    platoon: Option<&str>,
    command_speed: f64,
    downtrack: f64,
    speed: f64,
) -> RawMessage {
    raw(CoordinationMessage::Operation(MobilityOperation::status(
        id(sender),
        platoon.map(PlatoonId::new),
        StatusParams {
            command_speed,
            downtrack,
            speed,
        },
        0,
    )))
}

/// INFO broadcast from a platoon leader.
pub fn raw_info(
    sender: &str,
    platoon: &str,
    rear: &str,
    length: f64,
    speed: f64,
    size: usize,
) -> RawMessage {
    raw(CoordinationMessage::Operation(MobilityOperation::info(
        id(sender),
        Some(PlatoonId::new(platoon)),
        InfoParams {
            rear: id(rear),
            length,
            speed,
            size,
        },
        0,
    )))
}

/// Join request of a lone vehicle at `downtrack` driving at `speed`.
pub fn raw_join(sender: &str, recipient: &str, plan: &str, downtrack: f64, speed: f64) -> RawMessage {
    raw(CoordinationMessage::Request(MobilityRequest::join(
        id(sender),
        id(recipient),
        PlanId::new(plan),
        JoinParams {
            size: 1,
            speed,
            downtrack,
        },
        location(downtrack, 0.0),
        0,
    )))
}

/// Broadcast leadership claim from a vehicle at `downtrack`.
pub fn raw_claim(sender: &str, plan: &str, downtrack: f64) -> RawMessage {
    raw(CoordinationMessage::Request(MobilityRequest::claim_leadership(
        id(sender),
        PlanId::new(plan),
        StatusParams {
            command_speed: 20.0,
            downtrack,
            speed: 20.0,
        },
        location(downtrack, 0.0),
        0,
    )))
}

/// Departure notice addressed to `leader`.
pub fn raw_departure(sender: &str, leader: &str, plan: &str, downtrack: f64) -> RawMessage {
    raw(CoordinationMessage::Request(MobilityRequest::departure(
        id(sender),
        id(leader),
        PlanId::new(plan),
        StatusParams {
            command_speed: 20.0,
            downtrack,
            speed: 20.0,
        },
        location(downtrack, 0.0),
        0,
    )))
}

/// Response to the plan `plan` issued by `recipient`.
pub fn raw_response(sender: &str, recipient: &str, plan: &str, accepted: bool) -> RawMessage {
    raw(CoordinationMessage::Response(MobilityResponse {
        sender: id(sender),
        recipient: id(recipient),
        plan_id: PlanId::new(plan),
        accepted,
        timestamp_ms: 0,
    }))
}

/// Operation record with arbitrary, possibly malformed, strategy parameters.
pub fn raw_operation(sender: &str, platoon: &str, strategy_params: &str) -> RawMessage {
    RawMessage::Operation(RawOperation {
        header: MobilityHeader {
            sender_id: sender.to_string(),
            recipient_id: String::new(),
            plan_id: platoon.to_string(),
            timestamp_ms: 0,
        },
        strategy: wire::PLATOONING_STRATEGY.to_string(),
        strategy_params: strategy_params.to_string(),
    })
}

/// Decode a record produced by the code under test, panicking on error.
pub fn decoded(raw: &RawMessage) -> CoordinationMessage {
    wire::decode(raw).expect("record produced by the state machine must decode")
}
