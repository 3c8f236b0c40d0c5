//! Responses to negotiation requests.

use crate::MobilityRequest;
use platoon_types::{PlanId, VehicleId};

/// Accept or reject of a pending request, matched by plan id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobilityResponse {
    /// Responding vehicle.
    pub sender: VehicleId,
    /// Vehicle that issued the request.
    pub recipient: VehicleId,
    /// Plan id of the request being answered.
    pub plan_id: PlanId,
    /// Whether the request was accepted.
    pub accepted: bool,
    /// Responder timestamp (ms).
    pub timestamp_ms: u64,
}

impl MobilityResponse {
    /// Answer `request` on behalf of `responder`.
    pub fn answer(
        request: &MobilityRequest,
        responder: VehicleId,
        accepted: bool,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            sender: responder,
            recipient: request.sender.clone(),
            plan_id: request.plan_id.clone(),
            accepted,
            timestamp_ms,
        }
    }
}
