//! Negotiation requests.

use crate::{JoinParams, StatusParams, StrategyParams};
use platoon_types::{EcefPoint, PlanId, PlanType, VehicleId};

/// A join, leadership or departure proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct MobilityRequest {
    /// Proposing vehicle.
    pub sender: VehicleId,
    /// Addressee, `None` for a broadcast proposal.
    pub recipient: Option<VehicleId>,
    /// Plan id echoed by the response.
    pub plan_id: PlanId,
    /// Kind of proposal.
    pub plan_type: PlanType,
    /// Strategy parameters; the variant is fixed by `plan_type`.
    pub params: StrategyParams,
    /// Sender location at the time of the request.
    pub location: EcefPoint,
    /// Sender timestamp (ms).
    pub timestamp_ms: u64,
}

impl MobilityRequest {
    /// Request to join the platoon led by `recipient` at its rear.
    pub fn join(
        sender: VehicleId,
        recipient: VehicleId,
        plan_id: PlanId,
        params: JoinParams,
        location: EcefPoint,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            sender,
            recipient: Some(recipient),
            plan_id,
            plan_type: PlanType::JoinPlatoonAtRear,
            params: StrategyParams::Join(params),
            location,
            timestamp_ms,
        }
    }

    /// Broadcast leadership claim.
    pub fn claim_leadership(
        sender: VehicleId,
        plan_id: PlanId,
        params: StatusParams,
        location: EcefPoint,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            sender,
            recipient: None,
            plan_id,
            plan_type: PlanType::CandidateLeader,
            params: StrategyParams::Status(params),
            location,
            timestamp_ms,
        }
    }

    /// Notify the leader that the sender leaves the platoon.
    pub fn departure(
        sender: VehicleId,
        leader: VehicleId,
        plan_id: PlanId,
        params: StatusParams,
        location: EcefPoint,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            sender,
            recipient: Some(leader),
            plan_id,
            plan_type: PlanType::PlatoonDeparture,
            params: StrategyParams::Status(params),
            location,
            timestamp_ms,
        }
    }

    /// Strategy tag that `plan_type` requires.
    pub fn expected_tag(plan_type: PlanType) -> &'static str {
        match plan_type {
            PlanType::JoinPlatoonAtRear => "JOIN",
            PlanType::CandidateLeader | PlanType::PlatoonDeparture => "STATUS",
        }
    }

    /// Join parameters, if this is a join request.
    pub fn join_params(&self) -> Option<&JoinParams> {
        match &self.params {
            StrategyParams::Join(join) => Some(join),
            _ => None,
        }
    }

    /// Status parameters, if this request carries them.
    pub fn status_params(&self) -> Option<&StatusParams> {
        match &self.params {
            StrategyParams::Status(status) => Some(status),
            _ => None,
        }
    }

    /// Check whether the request is addressed to `vehicle` (or broadcast).
    pub fn is_for(&self, vehicle: &VehicleId) -> bool {
        self.recipient.as_ref().map_or(true, |r| r == vehicle)
    }
}
