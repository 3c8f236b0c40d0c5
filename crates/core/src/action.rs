//! Outputs of the coordination state machine.

use crate::{OutboundMessage, PlatooningInfo, TimerId};
use std::time::Duration;

/// All possible outputs from the state machine.
///
/// The runner executes these; the state machine itself performs no I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Publish a coordination message to the transport.
    Publish { message: OutboundMessage },

    /// Fire `id` once after `duration`, replacing any pending timer with the same id.
    SetTimer { id: TimerId, duration: Duration },

    /// Fire `id` every `period` until cancelled.
    SetRepeatingTimer { id: TimerId, period: Duration },

    /// Cancel a pending timer. Already-delivered firings are not undone.
    CancelTimer { id: TimerId },

    /// Publish the host's status snapshot for observers.
    PublishStatus { info: PlatooningInfo },
}

impl Action {
    /// Get a human-readable name for this action type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Publish { .. } => "Publish",
            Action::SetTimer { .. } => "SetTimer",
            Action::SetRepeatingTimer { .. } => "SetRepeatingTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::PublishStatus { .. } => "PublishStatus",
        }
    }
}
