//! Platoon roles and negotiation plan types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of the host vehicle in the platoon protocol.
///
/// Exactly one value is active per host at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlatoonState {
    /// Not part of any platoon.
    #[default]
    Standby,

    /// Leader waiting for its merge request to be answered.
    LeaderWaiting,

    /// Platoon head.
    Leader,

    /// Follower claiming leadership after the leader went silent.
    CandidateLeader,

    /// Waiting for a leader to accept our join request.
    CandidateFollower,

    /// Member tracking a leader.
    Follower,
}

impl PlatoonState {
    /// Protocol name of this state, as published in status snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatoonState::Standby => "STANDBY",
            PlatoonState::LeaderWaiting => "LEADERWAITING",
            PlatoonState::Leader => "LEADER",
            PlatoonState::CandidateLeader => "CANDIDATELEADER",
            PlatoonState::CandidateFollower => "CANDIDATEFOLLOWER",
            PlatoonState::Follower => "FOLLOWER",
        }
    }

    /// Transient states held while a negotiation is pending.
    pub fn is_negotiating(&self) -> bool {
        matches!(
            self,
            PlatoonState::LeaderWaiting
                | PlatoonState::CandidateLeader
                | PlatoonState::CandidateFollower
        )
    }

    /// States that belong to a formed platoon and broadcast platoon status.
    pub fn is_platooning(&self) -> bool {
        matches!(self, PlatoonState::Leader | PlatoonState::Follower)
    }
}

impl fmt::Display for PlatoonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of proposal carried by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanType {
    /// Join the platoon ahead at its rear (lone vehicle or whole-platoon merge).
    JoinPlatoonAtRear,

    /// Claim leadership of the current platoon.
    CandidateLeader,

    /// Leave the current platoon.
    PlatoonDeparture,
}

impl PlanType {
    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::JoinPlatoonAtRear => "JoinPlatoonAtRear",
            PlanType::CandidateLeader => "CandidateLeader",
            PlanType::PlatoonDeparture => "PlatoonDeparture",
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_classification() {
        assert!(PlatoonState::LeaderWaiting.is_negotiating());
        assert!(PlatoonState::CandidateLeader.is_negotiating());
        assert!(PlatoonState::CandidateFollower.is_negotiating());
        assert!(!PlatoonState::Leader.is_negotiating());

        assert!(PlatoonState::Leader.is_platooning());
        assert!(PlatoonState::Follower.is_platooning());
        assert!(!PlatoonState::Standby.is_platooning());
    }

    #[test]
    fn test_state_names() {
        assert_eq!(PlatoonState::default(), PlatoonState::Standby);
        assert_eq!(PlatoonState::LeaderWaiting.to_string(), "LEADERWAITING");
        assert_eq!(PlatoonState::CandidateFollower.to_string(), "CANDIDATEFOLLOWER");
    }
}
