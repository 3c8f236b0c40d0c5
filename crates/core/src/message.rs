//! Outbound message types for network communication.

use platoon_messages::{
    wire, Channel, CoordinationMessage, MobilityOperation, MobilityRequest, MobilityResponse,
    RawMessage,
};

/// Outbound coordination messages.
///
/// These are the messages that a vehicle can send to its peers.
/// The runner handles encoding and the actual transport I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Join, leadership or departure proposal.
    Request(MobilityRequest),

    /// Answer to a peer's proposal.
    Response(MobilityResponse),

    /// Periodic STATUS or INFO broadcast.
    Operation(MobilityOperation),
}

impl OutboundMessage {
    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundMessage::Request(_) => "Request",
            OutboundMessage::Response(_) => "Response",
            OutboundMessage::Operation(_) => "Operation",
        }
    }

    /// Channel the message is published on.
    pub fn channel(&self) -> Channel {
        match self {
            OutboundMessage::Request(_) => Channel::Request,
            OutboundMessage::Response(_) => Channel::Response,
            OutboundMessage::Operation(_) => Channel::Operation,
        }
    }

    /// Check if this is a negotiation message (request or response).
    pub fn is_negotiation(&self) -> bool {
        matches!(
            self,
            OutboundMessage::Request(_) | OutboundMessage::Response(_)
        )
    }

    /// Encode into a transport record.
    pub fn to_raw(&self) -> RawMessage {
        wire::encode(&self.clone().into())
    }
}

impl From<OutboundMessage> for CoordinationMessage {
    fn from(message: OutboundMessage) -> Self {
        match message {
            OutboundMessage::Request(r) => CoordinationMessage::Request(r),
            OutboundMessage::Response(r) => CoordinationMessage::Response(r),
            OutboundMessage::Operation(o) => CoordinationMessage::Operation(o),
        }
    }
}
