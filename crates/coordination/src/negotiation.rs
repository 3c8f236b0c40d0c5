//! Epoch-gated negotiation tracking.
//!
//! At most one negotiation (join, merge or leadership claim) is pending at a
//! time. Each one is stamped with a fresh [`NegotiationEpoch`], and its
//! timeout timer carries that epoch. A pending negotiation ends in exactly
//! one of three ways:
//!
//! - a response with the matching plan id ([`NegotiationTracker::conclude`])
//! - its timer firing ([`NegotiationTracker::on_timeout`])
//! - the spin tick noticing it is overdue ([`NegotiationTracker::expire`])
//!
//! Whichever happens first consumes the record; the others then find nothing
//! and are no-ops.

use platoon_core::{Action, NegotiationEpoch, TimerId};
use platoon_types::{PlanId, PlatoonState, VehicleId};
use std::time::Duration;
use tracing::debug;

/// What the host proposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationKind {
    /// Lone vehicle asking `target` to take it at the rear.
    JoinPlatoon { target: VehicleId },
    /// Leader asking `target` to absorb its whole platoon.
    MergeForward { target: VehicleId },
    /// Follower claiming leadership of its platoon.
    LeadershipClaim,
}

/// The negotiation currently awaiting an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNegotiation {
    pub epoch: NegotiationEpoch,
    pub plan_id: PlanId,
    pub kind: NegotiationKind,
    pub started_at: Duration,
    /// Role to return to if the negotiation fails.
    pub prior_state: PlatoonState,
}

impl PendingNegotiation {
    /// Timer guarding this negotiation.
    pub fn timer(&self) -> TimerId {
        TimerId::Negotiation(self.epoch)
    }
}

/// Tracks the single pending negotiation of a host.
#[derive(Debug)]
pub struct NegotiationTracker {
    timeout: Duration,
    last_epoch: NegotiationEpoch,
    pending: Option<PendingNegotiation>,
}

impl NegotiationTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_epoch: NegotiationEpoch::default(),
            pending: None,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn pending(&self) -> Option<&PendingNegotiation> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Start a negotiation, superseding any pending one.
    ///
    /// Returns the actions arming its timeout (and cancelling the superseded
    /// timer, if any).
    pub fn begin(
        &mut self,
        plan_id: PlanId,
        kind: NegotiationKind,
        prior_state: PlatoonState,
        now: Duration,
    ) -> Vec<Action> {
        let mut actions = Vec::new();
        if let Some(old) = self.pending.take() {
            debug!(epoch = %old.epoch, plan = %old.plan_id, "Superseding pending negotiation");
            actions.push(Action::CancelTimer { id: old.timer() });
        }

        self.last_epoch = self.last_epoch.next();
        let pending = PendingNegotiation {
            epoch: self.last_epoch,
            plan_id,
            kind,
            started_at: now,
            prior_state,
        };
        debug!(epoch = %pending.epoch, plan = %pending.plan_id, "Negotiation started");

        actions.push(Action::SetTimer {
            id: pending.timer(),
            duration: self.timeout,
        });
        self.pending = Some(pending);
        actions
    }

    /// Consume the pending negotiation if `plan_id` matches it.
    pub fn conclude(&mut self, plan_id: &PlanId) -> Option<(PendingNegotiation, Action)> {
        if self.pending.as_ref()?.plan_id != *plan_id {
            return None;
        }
        self.take()
    }

    /// Consume the pending negotiation if its timer, `epoch`, fired.
    ///
    /// A stale epoch leaves the tracker untouched.
    pub fn on_timeout(&mut self, epoch: NegotiationEpoch) -> Option<PendingNegotiation> {
        if self.pending.as_ref()?.epoch != epoch {
            return None;
        }
        self.pending.take()
    }

    /// Consume the pending negotiation if it has been waiting for the full timeout.
    pub fn expire(&mut self, now: Duration) -> Option<(PendingNegotiation, Action)> {
        let started_at = self.pending.as_ref()?.started_at;
        if now.saturating_sub(started_at) < self.timeout {
            return None;
        }
        self.take()
    }

    /// Drop the pending negotiation unconditionally.
    pub fn abandon(&mut self) -> Option<(PendingNegotiation, Action)> {
        self.take()
    }

    fn take(&mut self) -> Option<(PendingNegotiation, Action)> {
        let pending = self.pending.take()?;
        let cancel = Action::CancelTimer { id: pending.timer() };
        Some((pending, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> NegotiationTracker {
        NegotiationTracker::new(Duration::from_secs(2))
    }

    fn plan(seq: u64) -> PlanId {
        PlanId::derive(&VehicleId::from("host"), seq)
    }

    fn begin(tracker: &mut NegotiationTracker, seq: u64, now: Duration) -> NegotiationEpoch {
        tracker.begin(
            plan(seq),
            NegotiationKind::LeadershipClaim,
            PlatoonState::Follower,
            now,
        );
        tracker.pending().unwrap().epoch
    }

    #[test]
    fn test_begin_arms_timer_with_fresh_epoch() {
        let mut tracker = tracker();
        let actions = tracker.begin(
            plan(1),
            NegotiationKind::JoinPlatoon {
                target: VehicleId::from("lead"),
            },
            PlatoonState::Standby,
            Duration::ZERO,
        );
        assert_eq!(
            actions,
            vec![Action::SetTimer {
                id: TimerId::Negotiation(NegotiationEpoch(1)),
                duration: Duration::from_secs(2),
            }]
        );

        let actions = tracker.begin(
            plan(2),
            NegotiationKind::LeadershipClaim,
            PlatoonState::Follower,
            Duration::ZERO,
        );
        assert_eq!(
            actions[0],
            Action::CancelTimer {
                id: TimerId::Negotiation(NegotiationEpoch(1))
            }
        );
        assert_eq!(tracker.pending().unwrap().epoch, NegotiationEpoch(2));
    }

    #[test]
    fn test_stale_epoch_is_ignored() {
        let mut tracker = tracker();
        let first = begin(&mut tracker, 1, Duration::ZERO);
        let second = begin(&mut tracker, 2, Duration::ZERO);

        assert!(tracker.on_timeout(first).is_none());
        assert!(tracker.is_pending());

        let pending = tracker.on_timeout(second).unwrap();
        assert_eq!(pending.plan_id, plan(2));
        assert!(!tracker.is_pending());
    }

    #[test]
    fn test_timeout_takes_effect_once() {
        let mut tracker = tracker();
        let epoch = begin(&mut tracker, 1, Duration::from_secs(1));

        assert!(tracker.expire(Duration::from_millis(2_999)).is_none());
        let (pending, cancel) = tracker.expire(Duration::from_secs(3)).unwrap();
        assert_eq!(pending.epoch, epoch);
        assert_eq!(cancel, Action::CancelTimer { id: pending.timer() });

        // The timer firing afterwards finds nothing.
        assert!(tracker.on_timeout(epoch).is_none());
        assert!(tracker.expire(Duration::from_secs(10)).is_none());
    }

    #[test]
    fn test_conclude_matches_plan_id() {
        let mut tracker = tracker();
        let epoch = begin(&mut tracker, 1, Duration::ZERO);

        assert!(tracker.conclude(&plan(9)).is_none());
        let (pending, _) = tracker.conclude(&plan(1)).unwrap();
        assert_eq!(pending.prior_state, PlatoonState::Follower);

        assert!(tracker.on_timeout(epoch).is_none());
        assert!(tracker.conclude(&plan(1)).is_none());
    }
}
