//! Core types for platoon coordination.
//!
//! Identifiers, protocol roles and route positions shared by the codec,
//! the state machine and the runners.

mod identifiers;
mod position;
mod state;

pub use identifiers::{PlanId, PlatoonId, VehicleId, RESERVED_CHARS};
pub use position::{EcefPoint, RoutePosition};
pub use state::{PlanType, PlatoonState};
