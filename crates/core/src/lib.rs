//! Core types for platoon coordination.
//!
//! This crate provides the foundational types for the coordination architecture:
//!
//! - [`Event`]: All possible inputs to the state machine
//! - [`Action`]: All possible outputs from the state machine
//! - [`EventPriority`]: Ordering priority for events at the same timestamp
//! - [`StateMachine`]: The trait the coordination state machine implements
//!
//! # Architecture
//!
//! ```text
//! Events → StateMachine::handle() → Actions
//! ```
//!
//! All I/O is handled by the runner (simulation or production) which:
//! 1. Delivers events to the state machine, one at a time
//! 2. Executes the returned actions (publish, timers, status)
//! 3. Converts timer firings and inbound messages back into events

mod action;
mod event;
mod message;
mod status;
mod traits;

pub use action::Action;
pub use event::{Event, EventPriority};
pub use message::OutboundMessage;
pub use status::PlatooningInfo;
pub use traits::{GeoError, Georeference, Lifecycle, StateMachine, TimerService};

use std::fmt;

/// Token identifying one negotiation attempt.
///
/// Every negotiation timeout carries the epoch it was scheduled under; a
/// firing whose epoch no longer matches the pending negotiation is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NegotiationEpoch(pub u64);

impl NegotiationEpoch {
    pub fn next(self) -> Self {
        NegotiationEpoch(self.0 + 1)
    }
}

impl fmt::Display for NegotiationEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch({})", self.0)
    }
}

/// Timer identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Periodic spin (sweeps, broadcasts, status)
    Spin,
    /// Timeout of the negotiation started under the given epoch
    Negotiation(NegotiationEpoch),
}

impl TimerId {
    /// Event delivered when this timer fires.
    pub fn event(&self) -> Event {
        match self {
            TimerId::Spin => Event::SpinTimer,
            TimerId::Negotiation(epoch) => Event::NegotiationTimeout { epoch: *epoch },
        }
    }
}
