//! Coordination messages for the platooning protocol.

mod error;
mod operation;
pub mod params;
mod request;
mod response;
pub mod wire;

pub use error::CodecError;
pub use operation::{MobilityOperation, OperationKind, OperationParams};
pub use params::{InfoParams, JoinParams, StatusParams, StrategyParams, MAX_WIRE_PLATOON_SIZE};
pub use request::MobilityRequest;
pub use response::MobilityResponse;
pub use wire::{Channel, MobilityHeader, RawMessage, RawOperation, RawRequest, RawResponse};

use platoon_types::VehicleId;

/// A decoded coordination message.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinationMessage {
    /// Join, leadership or departure proposal.
    Request(MobilityRequest),

    /// Accept or reject of a pending request.
    Response(MobilityResponse),

    /// Periodic platoon or vehicle status broadcast.
    Operation(MobilityOperation),
}

impl CoordinationMessage {
    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            CoordinationMessage::Request(_) => "Request",
            CoordinationMessage::Response(_) => "Response",
            CoordinationMessage::Operation(_) => "Operation",
        }
    }

    /// Vehicle that sent this message.
    pub fn sender(&self) -> &VehicleId {
        match self {
            CoordinationMessage::Request(r) => &r.sender,
            CoordinationMessage::Response(r) => &r.sender,
            CoordinationMessage::Operation(o) => &o.sender,
        }
    }

    /// Channel this message travels on.
    pub fn channel(&self) -> Channel {
        match self {
            CoordinationMessage::Request(_) => Channel::Request,
            CoordinationMessage::Response(_) => Channel::Response,
            CoordinationMessage::Operation(_) => Channel::Operation,
        }
    }
}
