//! Reasons a join request is refused.

use platoon_types::PlatoonState;
use thiserror::Error;

/// Why a join request at the platoon rear was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JoinRejection {
    #[error("Host cannot take joiners while {0}")]
    Busy(PlatoonState),

    #[error("Platoon is full ({size} of {max})")]
    PlatoonFull { size: usize, max: usize },

    #[error("Gap to the platoon rear is {gap:.2} m, outside [{min}, {max}]")]
    GapOutOfRange { gap: f64, min: f64, max: f64 },

    #[error("Speed difference {difference:.2} m/s exceeds {max} m/s")]
    SpeedMismatch { difference: f64, max: f64 },

    #[error("Requester speed {speed:.2} m/s is below {min} m/s")]
    TooSlow { speed: f64, min: f64 },

    #[error("Requester is {offset:.2} m off the route, limit {max} m")]
    OffLane { offset: f64, max: f64 },

    #[error("Requester location cannot be placed on the route: {0}")]
    Unlocatable(String),

    #[error("Host position is unknown")]
    HostPositionUnknown,
}
