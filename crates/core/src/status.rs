//! Status snapshot published for observers.

use platoon_types::{PlatoonId, PlatoonState, VehicleId};
use serde::Serialize;

/// The only state a coordination instance exposes to telemetry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatooningInfo {
    /// Host vehicle.
    pub host_id: VehicleId,

    /// Current protocol role.
    pub state: PlatoonState,

    /// Platoon the host belongs to.
    pub platoon_id: Option<PlatoonId>,

    /// Governing leader (the host itself when leading).
    pub leader_id: Option<VehicleId>,

    /// Number of roster entries, host excluded.
    pub roster_size: usize,

    /// Host commanded speed (m/s).
    pub command_speed: f64,

    /// Distance to the immediate predecessor when following (m).
    pub front_gap: Option<f64>,

    /// Consecutive negotiations that ended in rejection or timeout.
    ///
    /// Keeps climbing while the host oscillates between STANDBY and a
    /// negotiating state.
    pub failed_negotiations: u32,

    /// Total number of state transitions since activation.
    pub transitions: u64,
}

impl PlatooningInfo {
    /// Vehicles in the host's platoon, host included.
    pub fn platoon_size(&self) -> usize {
        if self.state.is_platooning() {
            self.roster_size + 1
        } else {
            1
        }
    }
}
