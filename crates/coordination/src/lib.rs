//! Platoon coordination state machine.
//!
//! This crate provides the synchronous coordination logic shared by the
//! simulation and production runners.
//!
//! # Architecture
//!
//! The state machine processes events synchronously:
//!
//! - `Event::HostStateUpdated` → Store host pose, project it onto the route
//! - `Event::MessageReceived` → Decode, then update roster or answer requests
//! - `Event::SpinTimer` → Sweep, check leader, try joining, broadcast
//! - `Event::NegotiationTimeout` → Resolve the pending negotiation if its epoch matches
//!
//! All I/O is performed by the runner via returned `Action`s.

mod config;
mod error;
mod negotiation;
mod neighbors;
mod roster;
mod state;

pub use config::{ConfigError, PlatoonConfig};
pub use error::JoinRejection;
pub use negotiation::{NegotiationKind, NegotiationTracker, PendingNegotiation};
pub use neighbors::{JoinTarget, Neighbor, NeighborTable};
pub use roster::{PlatoonMember, Roster, RosterError};
pub use state::PlatoonStateMachine;
