//! Inputs to the coordination state machine.

use crate::NegotiationEpoch;
use platoon_messages::RawMessage;
use platoon_types::EcefPoint;

/// Ordering priority for events at the same timestamp.
///
/// Lower values are processed first. Timer events run before network
/// deliveries so that a timeout and a late response arriving at the same
/// instant resolve the same way on every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    /// Host kinematics from local sensors.
    Host = 0,
    /// Timer firings.
    Timer = 1,
    /// Messages from peers.
    Network = 2,
}

/// All possible inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Periodic tick: sweeps, timeout checks, broadcasts, status snapshot.
    SpinTimer,

    /// Negotiation timeout scheduled under `epoch`.
    ///
    /// Ignored unless `epoch` is still the pending negotiation's epoch.
    NegotiationTimeout { epoch: NegotiationEpoch },

    /// A coordination message delivered by the transport, not yet decoded.
    MessageReceived(RawMessage),

    /// Latest host pose and speeds.
    HostStateUpdated {
        location: EcefPoint,
        speed: f64,
        command_speed: f64,
    },
}

impl Event {
    /// Get the priority of this event.
    pub fn priority(&self) -> EventPriority {
        match self {
            Event::HostStateUpdated { .. } => EventPriority::Host,
            Event::SpinTimer | Event::NegotiationTimeout { .. } => EventPriority::Timer,
            Event::MessageReceived(_) => EventPriority::Network,
        }
    }

    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::SpinTimer => "SpinTimer",
            Event::NegotiationTimeout { .. } => "NegotiationTimeout",
            Event::MessageReceived(_) => "MessageReceived",
            Event::HostStateUpdated { .. } => "HostStateUpdated",
        }
    }
}
