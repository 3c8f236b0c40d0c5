//! Platoon roster.
//!
//! Ordered collection of the platoon members other than the host. Entries
//! are keyed by static id, so an id can appear at most once, and kept sorted
//! by downtrack distance, most advanced first. Entries with equal downtrack
//! distance are ordered by static id so that every peer derives the same
//! order from the same reports.

use indexmap::IndexMap;
use platoon_types::{PlatoonState, VehicleId};
use std::cmp::Ordering;
use std::time::Duration;
use thiserror::Error;

/// One platoon participant as seen by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatoonMember {
    /// Broadcast identity of the peer.
    pub static_id: VehicleId,
    /// Last commanded speed (m/s).
    pub command_speed: f64,
    /// Position along the shared route (m).
    pub downtrack: f64,
    /// Last measured speed (m/s).
    pub current_speed: f64,
    /// Lateral offset from the route (m).
    pub vehicle_offset: f64,
    /// Local time the entry was last refreshed.
    pub last_update: Duration,
    /// Role the peer last advertised; `None` until something is heard.
    pub reported_state: Option<PlatoonState>,
}

impl PlatoonMember {
    pub fn new(
        static_id: VehicleId,
        command_speed: f64,
        downtrack: f64,
        current_speed: f64,
        vehicle_offset: f64,
        last_update: Duration,
    ) -> Self {
        Self {
            static_id,
            command_speed,
            downtrack,
            current_speed,
            vehicle_offset,
            last_update,
            reported_state: None,
        }
    }

    /// Whether nothing has been heard from this member for longer than `timeout`.
    pub fn is_stale(&self, now: Duration, timeout: Duration) -> bool {
        now.saturating_sub(self.last_update) > timeout
    }
}

/// Errors from roster queries that depend on the host's role.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    /// The host is following but knows no platoon member.
    #[error("Host is a follower but the roster is empty")]
    EmptyRoster,

    /// The query only makes sense while following.
    #[error("Host is not a follower")]
    NotFollower,
}

/// Ordered platoon roster, host excluded.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    members: IndexMap<VehicleId, PlatoonMember>,
}

impl Roster {
    /// Create a new empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update an existing member in place or add a new one.
    ///
    /// The member's position is re-evaluated against the downtrack ordering
    /// either way. Returns the resulting roster size.
    pub fn update_or_add(
        &mut self,
        static_id: &VehicleId,
        command_speed: f64,
        downtrack: f64,
        current_speed: f64,
        vehicle_offset: f64,
        now: Duration,
    ) -> usize {
        match self.members.get_mut(static_id) {
            Some(member) => {
                member.command_speed = command_speed;
                member.downtrack = downtrack;
                member.current_speed = current_speed;
                member.vehicle_offset = vehicle_offset;
                member.last_update = now;
            }
            None => {
                self.members.insert(
                    static_id.clone(),
                    PlatoonMember::new(
                        static_id.clone(),
                        command_speed,
                        downtrack,
                        current_speed,
                        vehicle_offset,
                        now,
                    ),
                );
            }
        }
        self.sort();
        self.members.len()
    }

    /// Insert a complete member record, replacing any entry with the same id.
    pub fn insert(&mut self, member: PlatoonMember) -> usize {
        self.members.insert(member.static_id.clone(), member);
        self.sort();
        self.members.len()
    }

    fn sort(&mut self) {
        self.members
            .sort_by(|id_a, a, id_b, b| Self::order(id_a, a.downtrack, id_b, b.downtrack));
    }

    fn order(id_a: &VehicleId, dtd_a: f64, id_b: &VehicleId, dtd_b: f64) -> Ordering {
        dtd_b.total_cmp(&dtd_a).then_with(|| id_a.cmp(id_b))
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the roster is empty.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, static_id: &VehicleId) -> Option<&PlatoonMember> {
        self.members.get(static_id)
    }

    pub fn contains(&self, static_id: &VehicleId) -> bool {
        self.members.contains_key(static_id)
    }

    /// Head of the roster (most advanced member).
    pub fn leader(&self) -> Option<&PlatoonMember> {
        self.members.first().map(|(_, m)| m)
    }

    /// Rearmost member.
    pub fn rear(&self) -> Option<&PlatoonMember> {
        self.members.last().map(|(_, m)| m)
    }

    /// Members in roster order.
    pub fn iter(&self) -> impl Iterator<Item = &PlatoonMember> {
        self.members.values()
    }

    /// Members strictly ahead of `downtrack`, in roster order.
    pub fn ahead_of(&self, downtrack: f64) -> impl Iterator<Item = &PlatoonMember> {
        self.members.values().filter(move |m| m.downtrack > downtrack)
    }

    /// Nearest member strictly ahead of `downtrack`.
    pub fn predecessor_of(&self, downtrack: f64) -> Option<&PlatoonMember> {
        self.ahead_of(downtrack).last()
    }

    /// Record the role a member advertised. Returns false for unknown ids.
    pub fn set_reported_state(&mut self, static_id: &VehicleId, state: PlatoonState) -> bool {
        match self.members.get_mut(static_id) {
            Some(member) => {
                member.reported_state = Some(state);
                true
            }
            None => false,
        }
    }

    /// Refresh a member's last-heard time without touching its kinematics.
    pub fn touch(&mut self, static_id: &VehicleId, now: Duration) {
        if let Some(member) = self.members.get_mut(static_id) {
            member.last_update = now;
        }
    }

    /// Remove a member, keeping the order of the others.
    pub fn remove(&mut self, static_id: &VehicleId) -> Option<PlatoonMember> {
        self.members.shift_remove(static_id)
    }

    /// Remove every member positioned before `static_id`.
    pub fn drop_ahead_of(&mut self, static_id: &VehicleId) -> Vec<VehicleId> {
        let Some(index) = self.members.get_index_of(static_id) else {
            return vec![];
        };
        self.members.drain(..index).map(|(id, _)| id).collect()
    }

    /// Remove every member strictly ahead of `downtrack`.
    pub fn drop_ahead_of_position(&mut self, downtrack: f64) -> Vec<VehicleId> {
        let mut dropped = Vec::new();
        self.members.retain(|id, member| {
            if member.downtrack > downtrack {
                dropped.push(id.clone());
                false
            } else {
                true
            }
        });
        dropped
    }

    /// Remove members not heard from for longer than `timeout`.
    ///
    /// Returns the removed ids in roster order.
    pub fn sweep_stale(&mut self, now: Duration, timeout: Duration) -> Vec<VehicleId> {
        let mut swept = Vec::new();
        self.members.retain(|id, member| {
            if member.is_stale(now, timeout) {
                swept.push(id.clone());
                false
            } else {
                true
            }
        });
        swept
    }

    /// Remove all members.
    pub fn clear(&mut self) {
        self.members.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> VehicleId {
        VehicleId::from(s)
    }

    fn roster_of(members: &[(&str, f64)]) -> Roster {
        let mut roster = Roster::new();
        for (static_id, downtrack) in members {
            roster.update_or_add(&id(static_id), 1.0, *downtrack, 1.0, 0.0, Duration::ZERO);
        }
        roster
    }

    fn order(roster: &Roster) -> Vec<&str> {
        roster.iter().map(|m| m.static_id.as_str()).collect()
    }

    #[test]
    fn test_more_advanced_member_goes_first() {
        // Member "1": command speed 1.0, measured speed 1.1, downtrack 0.1.
        let mut roster = Roster::new();
        roster.insert(PlatoonMember::new(
            id("1"),
            1.0,
            0.1,
            1.1,
            0.0,
            Duration::from_millis(100),
        ));

        let size = roster.update_or_add(&id("2"), 2.0, 1.0, 0.0, 2.5, Duration::ZERO);

        assert_eq!(size, 2);
        assert_eq!(order(&roster), vec!["2", "1"]);
    }

    #[test]
    fn test_less_advanced_member_goes_last() {
        let mut roster = roster_of(&[("1", 1.1)]);
        let size = roster.update_or_add(&id("2"), 2.0, 1.0, 0.0, 2.5, Duration::ZERO);
        assert_eq!(size, 2);
        assert_eq!(order(&roster), vec!["1", "2"]);
    }

    #[test]
    fn test_update_preserves_identity_and_reorders() {
        let mut roster = roster_of(&[("a", 30.0), ("b", 20.0), ("c", 10.0)]);
        roster.set_reported_state(&id("c"), PlatoonState::Follower);

        let size = roster.update_or_add(&id("c"), 5.0, 35.0, 4.0, 0.3, Duration::from_secs(1));

        assert_eq!(size, 3);
        assert_eq!(order(&roster), vec!["c", "a", "b"]);
        let c = roster.get(&id("c")).unwrap();
        assert_eq!(c.command_speed, 5.0);
        assert_eq!(c.vehicle_offset, 0.3);
        assert_eq!(c.last_update, Duration::from_secs(1));
        assert_eq!(c.reported_state, Some(PlatoonState::Follower));
    }

    #[test]
    fn test_ids_stay_unique() {
        let mut roster = Roster::new();
        let updates = [
            ("x", 1.0),
            ("y", 2.0),
            ("x", 3.0),
            ("z", 0.5),
            ("y", 0.1),
            ("x", 3.0),
        ];
        for (step, (static_id, downtrack)) in updates.iter().enumerate() {
            roster.update_or_add(
                &id(static_id),
                0.0,
                *downtrack,
                0.0,
                0.0,
                Duration::from_millis(step as u64),
            );
            let mut ids: Vec<_> = roster.iter().map(|m| m.static_id.clone()).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), roster.len());
        }
        assert_eq!(order(&roster), vec!["x", "z", "y"]);
    }

    #[test]
    fn test_equal_downtrack_ties_break_by_id() {
        let roster = roster_of(&[("b", 5.0), ("c", 5.0), ("a", 5.0), ("d", 6.0)]);
        assert_eq!(order(&roster), vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn test_size_leader_and_rear() {
        let roster = roster_of(&[("1", 1.1), ("2", 2.1)]);
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.leader().unwrap().static_id, id("2"));
        assert_eq!(roster.rear().unwrap().static_id, id("1"));
        assert!(Roster::new().leader().is_none());
    }

    #[test]
    fn test_positions_relative_to_host() {
        let roster = roster_of(&[("a", 40.0), ("b", 30.0), ("c", 10.0)]);
        let ahead: Vec<_> = roster.ahead_of(20.0).map(|m| m.static_id.as_str()).collect();
        assert_eq!(ahead, vec!["a", "b"]);
        assert_eq!(roster.predecessor_of(20.0).unwrap().static_id, id("b"));
        assert!(roster.predecessor_of(50.0).is_none());
    }

    #[test]
    fn test_drop_ahead() {
        let mut roster = roster_of(&[("a", 40.0), ("b", 30.0), ("c", 10.0)]);
        assert_eq!(roster.drop_ahead_of(&id("b")), vec![id("a")]);
        assert_eq!(order(&roster), vec!["b", "c"]);
        assert!(roster.drop_ahead_of(&id("missing")).is_empty());

        let mut roster = roster_of(&[("a", 40.0), ("b", 30.0), ("c", 10.0)]);
        assert_eq!(roster.drop_ahead_of_position(20.0), vec![id("a"), id("b")]);
        assert_eq!(order(&roster), vec!["c"]);
    }

    #[test]
    fn test_sweep_removes_only_stale_members() {
        let mut roster = Roster::new();
        roster.update_or_add(&id("old"), 0.0, 10.0, 0.0, 0.0, Duration::from_secs(1));
        roster.update_or_add(&id("fresh"), 0.0, 5.0, 0.0, 0.0, Duration::from_secs(4));

        let swept = roster.sweep_stale(Duration::from_secs(5), Duration::from_secs(3));

        assert_eq!(swept, vec![id("old")]);
        assert_eq!(order(&roster), vec!["fresh"]);
    }
}
