//! Vehicles heard on the operation channel.
//!
//! The host keeps the latest STATUS and INFO of every vehicle it hears,
//! whether or not it belongs to the host's platoon. Join and merge targets are
//! picked from this table.

use platoon_messages::{InfoParams, MobilityOperation, OperationParams};
use platoon_types::{PlatoonId, VehicleId};
use std::collections::BTreeMap;
use std::time::Duration;

/// Latest broadcasts of one peer.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: VehicleId,
    /// Platoon the peer advertised, `None` when it is not platooning.
    pub platoon_id: Option<PlatoonId>,
    /// Downtrack distance from its last STATUS.
    pub downtrack: Option<f64>,
    pub speed: f64,
    pub command_speed: f64,
    /// Platoon summary, present only for peers that lead a platoon.
    pub info: Option<InfoParams>,
    pub last_seen: Duration,
}

impl Neighbor {
    fn new(id: VehicleId, last_seen: Duration) -> Self {
        Self {
            id,
            platoon_id: None,
            downtrack: None,
            speed: 0.0,
            command_speed: 0.0,
            info: None,
            last_seen,
        }
    }

    /// Whether the peer advertises itself as a platoon leader.
    pub fn is_leader(&self) -> bool {
        self.platoon_id.is_some() && self.info.is_some()
    }

    /// Whether the peer is driving alone.
    pub fn is_standalone(&self) -> bool {
        self.platoon_id.is_none()
    }

    /// Vehicles in the peer's platoon, itself included.
    pub fn platoon_size(&self) -> usize {
        self.info.as_ref().map_or(1, |info| info.size.max(1))
    }
}

/// A vehicle or platoon the host could attach to.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinTarget {
    /// Vehicle the join request is addressed to.
    pub leader: VehicleId,
    /// Distance from the host to the target's rear (m).
    pub gap: f64,
    pub platoon_size: usize,
}

/// Table of recently heard peers, ordered by id.
#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    entries: BTreeMap<VehicleId, Neighbor>,
}

impl NeighborTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an operation broadcast.
    pub fn observe(&mut self, operation: &MobilityOperation, now: Duration) {
        let entry = self
            .entries
            .entry(operation.sender.clone())
            .or_insert_with(|| Neighbor::new(operation.sender.clone(), now));

        // A summary from an earlier platoon no longer describes the peer.
        if entry.platoon_id != operation.platoon_id {
            entry.info = None;
            entry.platoon_id = operation.platoon_id.clone();
        }
        entry.last_seen = now;

        match &operation.params {
            OperationParams::Status(status) => {
                entry.downtrack = Some(status.downtrack);
                entry.speed = status.speed;
                entry.command_speed = status.command_speed;
            }
            OperationParams::Info(info) => {
                entry.speed = info.speed;
                entry.info = Some(info.clone());
            }
        }
    }

    pub fn get(&self, id: &VehicleId) -> Option<&Neighbor> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Downtrack distance of a neighbour's platoon rear.
    ///
    /// Uses the rear vehicle's own STATUS when it has been heard, otherwise
    /// the leader position minus the advertised platoon length.
    pub fn rear_downtrack(&self, neighbor: &Neighbor) -> Option<f64> {
        let downtrack = neighbor.downtrack?;
        let Some(info) = &neighbor.info else {
            return Some(downtrack);
        };
        let reported = self
            .entries
            .get(&info.rear)
            .filter(|rear| rear.platoon_id == neighbor.platoon_id)
            .and_then(|rear| rear.downtrack);
        Some(reported.unwrap_or(downtrack - info.length))
    }

    /// Nearest leader or standalone vehicle ahead whose rear lies within
    /// `[min_gap, max_gap]` of `host_downtrack`.
    ///
    /// Vehicles in `excluded` and members of `own_platoon` are skipped. Ties
    /// on gap go to the smaller id.
    pub fn join_target(
        &self,
        host_downtrack: f64,
        own_platoon: Option<&PlatoonId>,
        min_gap: f64,
        max_gap: f64,
        excluded: impl Fn(&VehicleId) -> bool,
    ) -> Option<JoinTarget> {
        self.entries
            .values()
            .filter(|n| n.is_leader() || n.is_standalone())
            .filter(|n| own_platoon.is_none() || n.platoon_id.as_ref() != own_platoon)
            .filter(|n| !excluded(&n.id))
            .filter_map(|n| {
                let leader_downtrack = n.downtrack?;
                if leader_downtrack <= host_downtrack {
                    return None;
                }
                let gap = self.rear_downtrack(n)? - host_downtrack;
                (min_gap..=max_gap).contains(&gap).then(|| JoinTarget {
                    leader: n.id.clone(),
                    gap,
                    platoon_size: n.platoon_size(),
                })
            })
            .min_by(|a, b| a.gap.total_cmp(&b.gap).then_with(|| a.leader.cmp(&b.leader)))
    }

    /// Remove peers not heard from for longer than `timeout`.
    pub fn sweep_stale(&mut self, now: Duration, timeout: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, n| now.saturating_sub(n.last_seen) <= timeout);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platoon_messages::StatusParams;

    fn status(sender: &str, platoon: Option<&str>, downtrack: f64) -> MobilityOperation {
        MobilityOperation::status(
            VehicleId::from(sender),
            platoon.map(PlatoonId::new),
            StatusParams {
                command_speed: 20.0,
                downtrack,
                speed: 20.0,
            },
            0,
        )
    }

    fn info(sender: &str, platoon: &str, rear: &str, length: f64, size: usize) -> MobilityOperation {
        MobilityOperation::info(
            VehicleId::from(sender),
            Some(PlatoonId::new(platoon)),
            InfoParams {
                rear: VehicleId::from(rear),
                length,
                speed: 20.0,
                size,
            },
            0,
        )
    }

    #[test]
    fn test_picks_nearest_standalone_vehicle_ahead() {
        let mut table = NeighborTable::new();
        table.observe(&status("far", None, 150.0), Duration::ZERO);
        table.observe(&status("near", None, 120.0), Duration::ZERO);
        table.observe(&status("behind", None, 80.0), Duration::ZERO);

        let target = table
            .join_target(100.0, None, 5.0, 60.0, |_| false)
            .unwrap();

        assert_eq!(target.leader, VehicleId::from("near"));
        assert_eq!(target.gap, 20.0);
        assert_eq!(target.platoon_size, 1);
    }

    #[test]
    fn test_gap_measured_to_platoon_rear() {
        let mut table = NeighborTable::new();
        table.observe(&status("lead", Some("p"), 200.0), Duration::ZERO);
        table.observe(&info("lead", "p", "tail", 40.0, 3), Duration::ZERO);

        let lead = table.get(&VehicleId::from("lead")).unwrap();
        assert_eq!(table.rear_downtrack(lead), Some(160.0));

        table.observe(&status("tail", Some("p"), 158.0), Duration::ZERO);
        let lead = table.get(&VehicleId::from("lead")).unwrap();
        assert_eq!(table.rear_downtrack(lead), Some(158.0));

        // Followers are never targets themselves.
        let target = table
            .join_target(130.0, None, 5.0, 60.0, |_| false)
            .unwrap();
        assert_eq!(target.leader, VehicleId::from("lead"));
        assert_eq!(target.platoon_size, 3);
    }

    #[test]
    fn test_skips_own_platoon_and_excluded() {
        let mut table = NeighborTable::new();
        table.observe(&status("lead", Some("p"), 120.0), Duration::ZERO);
        table.observe(&info("lead", "p", "lead", 0.0, 1), Duration::ZERO);
        table.observe(&status("solo", None, 130.0), Duration::ZERO);

        let own = PlatoonId::new("p");
        let target = table
            .join_target(100.0, Some(&own), 5.0, 60.0, |_| false)
            .unwrap();
        assert_eq!(target.leader, VehicleId::from("solo"));

        let solo = VehicleId::from("solo");
        assert!(table
            .join_target(100.0, Some(&own), 5.0, 60.0, |id| *id == solo)
            .is_none());
    }

    #[test]
    fn test_out_of_range_gap_is_ignored() {
        let mut table = NeighborTable::new();
        table.observe(&status("close", None, 102.0), Duration::ZERO);
        table.observe(&status("distant", None, 500.0), Duration::ZERO);
        assert!(table.join_target(100.0, None, 5.0, 60.0, |_| false).is_none());
    }

    #[test]
    fn test_sweep() {
        let mut table = NeighborTable::new();
        table.observe(&status("a", None, 1.0), Duration::from_secs(1));
        table.observe(&status("b", None, 1.0), Duration::from_secs(5));

        assert_eq!(table.sweep_stale(Duration::from_secs(6), Duration::from_secs(3)), 1);
        assert!(table.get(&VehicleId::from("a")).is_none());
        assert_eq!(table.len(), 1);
    }
}
