//! Platoon coordination state machine.

use crate::config::{ConfigError, PlatoonConfig};
use crate::error::JoinRejection;
use crate::negotiation::{NegotiationKind, NegotiationTracker, PendingNegotiation};
use crate::neighbors::NeighborTable;
use crate::roster::{PlatoonMember, Roster, RosterError};
use platoon_core::{
    Action, Event, Georeference, Lifecycle, NegotiationEpoch, OutboundMessage, PlatooningInfo,
    StateMachine, TimerId,
};
use platoon_messages::{
    wire, CoordinationMessage, InfoParams, JoinParams, MobilityOperation, MobilityRequest,
    MobilityResponse, OperationParams, RawMessage, StatusParams,
};
use platoon_types::{
    EcefPoint, PlanId, PlanType, PlatoonId, PlatoonState, RoutePosition, VehicleId,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Latest host pose and speeds.
#[derive(Debug, Clone, Copy, Default)]
struct HostKinematics {
    location: Option<EcefPoint>,
    speed: f64,
    command_speed: f64,
    /// Last successful projection of `location` onto the route.
    position: Option<RoutePosition>,
}

/// Platoon coordination state machine for one host vehicle.
///
/// Owns the host's role, its roster and the pending negotiation. Every input
/// arrives as an [`Event`]; every effect leaves as an [`Action`].
pub struct PlatoonStateMachine {
    host_id: VehicleId,
    config: PlatoonConfig,
    georeference: Arc<dyn Georeference>,

    /// Whether the host lifecycle has activated coordination.
    active: bool,
    state: PlatoonState,
    roster: Roster,
    platoon_id: Option<PlatoonId>,
    /// Governing leader; the host itself while leading.
    leader_id: Option<VehicleId>,

    host: HostKinematics,
    neighbors: NeighborTable,
    negotiation: NegotiationTracker,

    /// Consecutive negotiations that were rejected or timed out.
    failed_negotiations: u32,
    /// No new negotiation is started before this time.
    next_attempt_at: Duration,
    transitions: u64,
    plan_seq: u64,
    platoon_seq: u64,

    now: Duration,
}

impl std::fmt::Debug for PlatoonStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatoonStateMachine")
            .field("host_id", &self.host_id)
            .field("active", &self.active)
            .field("state", &self.state)
            .field("platoon_id", &self.platoon_id)
            .field("leader_id", &self.leader_id)
            .field("roster_size", &self.roster.len())
            .field("now", &self.now)
            .finish()
    }
}

impl PlatoonStateMachine {
    /// Create an inactive state machine in STANDBY.
    pub fn new(
        host_id: VehicleId,
        config: PlatoonConfig,
        georeference: Arc<dyn Georeference>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            host_id,
            negotiation: NegotiationTracker::new(config.negotiation_timeout),
            config,
            georeference,
            active: false,
            state: PlatoonState::Standby,
            roster: Roster::new(),
            platoon_id: None,
            leader_id: None,
            host: HostKinematics::default(),
            neighbors: NeighborTable::new(),
            failed_negotiations: 0,
            next_attempt_at: Duration::ZERO,
            transitions: 0,
            plan_seq: 0,
            platoon_seq: 0,
            now: Duration::ZERO,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn host_id(&self) -> &VehicleId {
        &self.host_id
    }

    pub fn state(&self) -> PlatoonState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn config(&self) -> &PlatoonConfig {
        &self.config
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn platoon_id(&self) -> Option<&PlatoonId> {
        self.platoon_id.as_ref()
    }

    pub fn leader_id(&self) -> Option<&VehicleId> {
        self.leader_id.as_ref()
    }

    pub fn neighbors(&self) -> &NeighborTable {
        &self.neighbors
    }

    pub fn failed_negotiations(&self) -> u32 {
        self.failed_negotiations
    }

    /// Pending negotiation, if any.
    pub fn pending_negotiation(&self) -> Option<&PendingNegotiation> {
        self.negotiation.pending()
    }

    /// Host downtrack distance from the last resolved position.
    pub fn host_downtrack(&self) -> Option<f64> {
        self.host.position.map(|p| p.downtrack)
    }

    /// Snapshot published for observers.
    pub fn status(&self) -> PlatooningInfo {
        PlatooningInfo {
            host_id: self.host_id.clone(),
            state: self.state,
            platoon_id: self.platoon_id.clone(),
            leader_id: self.leader_id.clone(),
            roster_size: self.roster.len(),
            command_speed: self.host.command_speed,
            front_gap: self.front_gap(),
            failed_negotiations: self.failed_negotiations,
            transitions: self.transitions,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Roster queries
    // ═══════════════════════════════════════════════════════════════════════════

    /// Number of roster entries, host excluded.
    pub fn host_platoon_size(&self) -> usize {
        self.roster.len()
    }

    /// Leader the host currently follows: the head of the roster.
    pub fn dynamic_leader(&self) -> Result<&PlatoonMember, RosterError> {
        if self.state != PlatoonState::Follower {
            return Err(RosterError::NotFollower);
        }
        self.roster.leader().ok_or(RosterError::EmptyRoster)
    }

    /// Number of predecessors that are known not to be following.
    ///
    /// The head of the roster is the governing leader and is not counted.
    /// A member that has not advertised a role yet counts as following.
    /// Zero unless the host is a follower.
    pub fn all_predecessor_following(&self) -> usize {
        if self.state != PlatoonState::Follower {
            return 0;
        }
        let host_downtrack = self.host_downtrack();
        self.roster
            .iter()
            .skip(1)
            .filter(|m| host_downtrack.map_or(true, |d| m.downtrack > d))
            .filter(|m| matches!(m.reported_state, Some(s) if s != PlatoonState::Follower))
            .count()
    }

    /// Distance to the nearest member ahead, while following.
    fn front_gap(&self) -> Option<f64> {
        if self.state != PlatoonState::Follower {
            return None;
        }
        let host_downtrack = self.host_downtrack()?;
        self.roster
            .predecessor_of(host_downtrack)
            .map(|p| p.downtrack - host_downtrack)
    }

    /// Downtrack distance of a peer from the roster or the neighbour table.
    fn peer_downtrack(&self, id: &VehicleId) -> Option<f64> {
        self.roster
            .get(id)
            .map(|m| m.downtrack)
            .or_else(|| self.neighbors.get(id).and_then(|n| n.downtrack))
    }

    fn is_ahead_of_host(&self, downtrack: Option<f64>) -> bool {
        match (downtrack, self.host_downtrack()) {
            (Some(peer), Some(host)) => peer > host,
            _ => false,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════════

    fn timestamp_ms(&self) -> u64 {
        self.now.as_millis() as u64
    }

    fn host_location(&self) -> EcefPoint {
        self.host.location.unwrap_or_default()
    }

    fn host_status(&self) -> Option<StatusParams> {
        Some(StatusParams {
            command_speed: self.host.command_speed,
            downtrack: self.host_downtrack()?,
            speed: self.host.speed,
        })
    }

    fn next_plan_id(&mut self) -> PlanId {
        self.plan_seq += 1;
        PlanId::derive(&self.host_id, self.plan_seq)
    }

    fn mint_platoon_id(&mut self) -> PlatoonId {
        self.platoon_seq += 1;
        PlatoonId::mint(&self.host_id, self.platoon_seq)
    }

    fn publish(message: OutboundMessage) -> Action {
        Action::Publish { message }
    }

    fn respond(&self, request: &MobilityRequest, accepted: bool) -> Action {
        Self::publish(OutboundMessage::Response(MobilityResponse::answer(
            request,
            self.host_id.clone(),
            accepted,
            self.timestamp_ms(),
        )))
    }

    fn transition(&mut self, next: PlatoonState, reason: &'static str) {
        if self.state == next {
            return;
        }
        info!(
            host = %self.host_id,
            from = %self.state,
            to = %next,
            reason,
            "Platoon state transition"
        );
        self.state = next;
        self.transitions += 1;

        if next == PlatoonState::Standby {
            self.roster.clear();
            self.platoon_id = None;
            self.leader_id = None;
        }
    }

    fn record_success(&mut self) {
        self.failed_negotiations = 0;
    }

    fn record_failure(&mut self) {
        self.failed_negotiations += 1;
        self.next_attempt_at = self.now + self.config.retry_backoff;
    }

    fn may_negotiate(&self) -> bool {
        !self.negotiation.is_pending() && self.now >= self.next_attempt_at
    }

    fn resolve_position(&mut self) -> Result<RoutePosition, String> {
        let location = self
            .host
            .location
            .ok_or_else(|| "no host location received".to_string())?;
        let position = self
            .georeference
            .to_route(&location)
            .map_err(|e| e.to_string())?;
        self.host.position = Some(position);
        Ok(position)
    }

    /// Make sure `id` has a roster entry, seeding it from the neighbour table.
    fn ensure_member(&mut self, id: &VehicleId) {
        if self.roster.contains(id) {
            return;
        }
        let fallback = self.host_downtrack().unwrap_or_default();
        let (downtrack, speed, command_speed) = self
            .neighbors
            .get(id)
            .map_or((fallback, 0.0, 0.0), |n| {
                (n.downtrack.unwrap_or(fallback), n.speed, n.command_speed)
            });
        self.roster
            .update_or_add(id, command_speed, downtrack, speed, 0.0, self.now);
    }

    /// Follow `leader`, dropping every roster entry ahead of it.
    fn adopt_leader(
        &mut self,
        leader: VehicleId,
        platoon_id: Option<PlatoonId>,
        reason: &'static str,
    ) {
        self.ensure_member(&leader);
        let dropped = self.roster.drop_ahead_of(&leader);
        if !dropped.is_empty() {
            debug!(host = %self.host_id, dropped = dropped.len(), "Dropped members ahead of new leader");
        }
        self.roster
            .set_reported_state(&leader, PlatoonState::Leader);
        if platoon_id.is_some() {
            self.platoon_id = platoon_id;
        }
        info!(host = %self.host_id, leader = %leader, "Following new leader");
        self.leader_id = Some(leader);
        self.transition(PlatoonState::Follower, reason);
    }

    /// Give up the pending negotiation without counting it as a failure.
    fn abandon_negotiation(&mut self) -> Vec<Action> {
        match self.negotiation.abandon() {
            Some((pending, cancel)) => {
                debug!(host = %self.host_id, plan = %pending.plan_id, "Abandoned negotiation");
                vec![cancel]
            }
            None => vec![],
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Host updates
    // ═══════════════════════════════════════════════════════════════════════════

    fn on_host_state(&mut self, location: EcefPoint, speed: f64, command_speed: f64) -> Vec<Action> {
        self.host.location = Some(location);
        self.host.speed = speed;
        self.host.command_speed = command_speed;
        if let Err(e) = self.resolve_position() {
            debug!(host = %self.host_id, error = %e, "Host position not resolved");
        }
        vec![]
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Spin
    // ═══════════════════════════════════════════════════════════════════════════

    fn on_spin(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        let position = self.resolve_position();

        if let Some((pending, cancel)) = self.negotiation.expire(self.now) {
            actions.push(cancel);
            actions.extend(self.on_negotiation_expired(pending));
        }

        if self.state == PlatoonState::Follower {
            actions.extend(self.check_leader());
        }

        let swept = self
            .roster
            .sweep_stale(self.now, self.config.member_timeout);
        if !swept.is_empty() {
            info!(host = %self.host_id, swept = ?swept, "Removed silent platoon members");
        }
        self.neighbors
            .sweep_stale(self.now, self.config.member_timeout);

        actions.extend(self.try_join());

        match position {
            Ok(position) => actions.extend(self.broadcasts(position)),
            Err(e) => {
                warn!(host = %self.host_id, error = %e, "Host position unavailable, skipping broadcasts");
            }
        }

        actions.push(Action::PublishStatus {
            info: self.status(),
        });
        actions
    }

    /// Leader silence and roster sanity checks while following.
    fn check_leader(&mut self) -> Vec<Action> {
        let silent = self.dynamic_leader().map(|leader| {
            self.now.saturating_sub(leader.last_update) > self.config.leader_timeout
        });

        match silent {
            Err(RosterError::EmptyRoster) => {
                error!(host = %self.host_id, "Following with an empty roster");
                self.transition(PlatoonState::Standby, "empty roster");
                vec![]
            }
            Err(RosterError::NotFollower) | Ok(false) => vec![],
            Ok(true) => {
                let not_following = self.all_predecessor_following();
                if not_following > 0 {
                    debug!(
                        host = %self.host_id,
                        not_following,
                        "Leader silent but a predecessor is not following"
                    );
                    return vec![];
                }
                if !self.may_negotiate() {
                    return vec![];
                }
                self.run_candidate_leader()
            }
        }
    }

    /// Broadcast a leadership claim and wait for the platoon to answer.
    fn run_candidate_leader(&mut self) -> Vec<Action> {
        let Some(status) = self.host_status() else {
            return vec![];
        };
        let plan_id = self.next_plan_id();
        info!(
            host = %self.host_id,
            silent_leader = ?self.leader_id,
            plan = %plan_id,
            "Leader silent, claiming leadership"
        );

        let request = MobilityRequest::claim_leadership(
            self.host_id.clone(),
            plan_id.clone(),
            status,
            self.host_location(),
            self.timestamp_ms(),
        );
        let mut actions = self.negotiation.begin(
            plan_id,
            NegotiationKind::LeadershipClaim,
            PlatoonState::Follower,
            self.now,
        );
        actions.push(Self::publish(OutboundMessage::Request(request)));
        self.transition(PlatoonState::CandidateLeader, "leader silent");
        actions
    }

    /// Ask the nearest suitable vehicle or platoon ahead to take the host.
    ///
    /// A leader asks on behalf of its whole platoon; its followers move over
    /// once they see the host's new platoon id.
    fn try_join(&mut self) -> Vec<Action> {
        let (next, merge) = match self.state {
            PlatoonState::Standby => (PlatoonState::CandidateFollower, false),
            PlatoonState::Leader => (PlatoonState::LeaderWaiting, true),
            _ => return vec![],
        };
        if !self.may_negotiate() {
            return vec![];
        }
        let Some(host_downtrack) = self.host_downtrack() else {
            return vec![];
        };

        let roster = &self.roster;
        let host_id = &self.host_id;
        let Some(target) = self.neighbors.join_target(
            host_downtrack,
            self.platoon_id.as_ref(),
            self.config.min_gap,
            self.config.max_gap,
            |id| id == host_id || roster.contains(id),
        ) else {
            return vec![];
        };

        let size = self.roster.len() + 1;
        if target.platoon_size.saturating_add(size) > self.config.max_platoon_size {
            debug!(
                host = %self.host_id,
                target = %target.leader,
                target_size = target.platoon_size,
                "Platoon ahead is full"
            );
            return vec![];
        }

        let plan_id = self.next_plan_id();
        info!(
            host = %self.host_id,
            target = %target.leader,
            gap = target.gap,
            plan = %plan_id,
            "Requesting to join platoon ahead"
        );

        let request = MobilityRequest::join(
            self.host_id.clone(),
            target.leader.clone(),
            plan_id.clone(),
            JoinParams {
                size,
                speed: self.host.speed,
                downtrack: host_downtrack,
            },
            self.host_location(),
            self.timestamp_ms(),
        );
        let kind = if merge {
            NegotiationKind::MergeForward {
                target: target.leader,
            }
        } else {
            NegotiationKind::JoinPlatoon {
                target: target.leader,
            }
        };
        let mut actions = self.negotiation.begin(plan_id, kind, self.state, self.now);
        actions.push(Self::publish(OutboundMessage::Request(request)));
        self.transition(next, "join requested");
        actions
    }

    /// Periodic STATUS from every state, INFO from leaders.
    fn broadcasts(&self, position: RoutePosition) -> Vec<Action> {
        let mut actions = vec![Self::publish(OutboundMessage::Operation(
            MobilityOperation::status(
                self.host_id.clone(),
                self.platoon_id.clone(),
                StatusParams {
                    command_speed: self.host.command_speed,
                    downtrack: position.downtrack,
                    speed: self.host.speed,
                },
                self.timestamp_ms(),
            ),
        ))];

        if self.state == PlatoonState::Leader {
            let (rear, length) = match self.roster.rear() {
                Some(rear) => (
                    rear.static_id.clone(),
                    (position.downtrack - rear.downtrack).max(0.0),
                ),
                None => (self.host_id.clone(), 0.0),
            };
            actions.push(Self::publish(OutboundMessage::Operation(
                MobilityOperation::info(
                    self.host_id.clone(),
                    self.platoon_id.clone(),
                    InfoParams {
                        rear,
                        length,
                        speed: self.host.speed,
                        size: self.roster.len() + 1,
                    },
                    self.timestamp_ms(),
                ),
            )));
        }
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Negotiation outcomes
    // ═══════════════════════════════════════════════════════════════════════════

    fn on_negotiation_timeout(&mut self, epoch: NegotiationEpoch) -> Vec<Action> {
        match self.negotiation.on_timeout(epoch) {
            Some(pending) => self.on_negotiation_expired(pending),
            None => {
                debug!(host = %self.host_id, %epoch, "Ignoring stale negotiation timeout");
                vec![]
            }
        }
    }

    fn on_negotiation_expired(&mut self, pending: PendingNegotiation) -> Vec<Action> {
        match pending.kind {
            NegotiationKind::LeadershipClaim => {
                info!(host = %self.host_id, plan = %pending.plan_id, "Leadership claim unopposed");
                self.commit_leadership();
            }
            NegotiationKind::JoinPlatoon { ref target } | NegotiationKind::MergeForward { ref target } => {
                warn!(
                    host = %self.host_id,
                    target = %target,
                    plan = %pending.plan_id,
                    "Join negotiation timed out"
                );
                self.fail_negotiation(&pending, "negotiation timed out");
            }
        }
        vec![]
    }

    fn fail_negotiation(&mut self, pending: &PendingNegotiation, reason: &'static str) {
        self.record_failure();
        if self.state.is_negotiating() {
            self.transition(pending.prior_state, reason);
        }
    }

    fn commit_leadership(&mut self) {
        if self.state != PlatoonState::CandidateLeader {
            return;
        }
        if let Some(old) = self.leader_id.take() {
            self.roster.remove(&old);
        }
        if let Some(host_downtrack) = self.host_downtrack() {
            let dropped = self.roster.drop_ahead_of_position(host_downtrack);
            if !dropped.is_empty() {
                debug!(host = %self.host_id, dropped = ?dropped, "Dropped members ahead of new leader");
            }
        }
        if self.platoon_id.is_none() {
            self.platoon_id = Some(self.mint_platoon_id());
        }
        self.leader_id = Some(self.host_id.clone());
        self.record_success();
        self.transition(PlatoonState::Leader, "leadership claimed");
    }

    fn on_response(&mut self, response: MobilityResponse) -> Vec<Action> {
        if response.recipient != self.host_id {
            return vec![];
        }

        let expected = self.negotiation.pending().is_some_and(|p| {
            p.plan_id == response.plan_id
                && match &p.kind {
                    NegotiationKind::JoinPlatoon { target }
                    | NegotiationKind::MergeForward { target } => *target == response.sender,
                    NegotiationKind::LeadershipClaim => true,
                }
        });
        if !expected {
            debug!(
                host = %self.host_id,
                sender = %response.sender,
                plan = %response.plan_id,
                "Ignoring response without a matching negotiation"
            );
            return vec![];
        }
        let Some((pending, cancel)) = self.negotiation.conclude(&response.plan_id) else {
            return vec![];
        };

        match (&pending.kind, response.accepted) {
            (
                NegotiationKind::JoinPlatoon { target } | NegotiationKind::MergeForward { target },
                true,
            ) => {
                let target = target.clone();
                let platoon_id = self
                    .neighbors
                    .get(&target)
                    .and_then(|n| n.platoon_id.clone());
                self.roster.clear();
                if self.state == PlatoonState::LeaderWaiting {
                    // Our own platoon id no longer applies.
                    self.platoon_id = None;
                }
                self.record_success();
                self.adopt_leader(target, platoon_id, "join accepted");
            }
            (NegotiationKind::LeadershipClaim, true) => {
                info!(host = %self.host_id, by = %response.sender, "Leadership claim accepted");
                self.commit_leadership();
            }
            (_, false) => {
                warn!(
                    host = %self.host_id,
                    by = %response.sender,
                    plan = %pending.plan_id,
                    "Negotiation rejected"
                );
                self.fail_negotiation(&pending, "negotiation rejected");
            }
        }
        vec![cancel]
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Requests
    // ═══════════════════════════════════════════════════════════════════════════

    fn on_request(&mut self, request: MobilityRequest) -> Vec<Action> {
        if !request.is_for(&self.host_id) {
            return vec![];
        }
        match request.plan_type {
            PlanType::JoinPlatoonAtRear => self.on_join_request(request),
            PlanType::CandidateLeader => self.on_leadership_claim(request),
            PlanType::PlatoonDeparture => self.on_departure(request),
        }
    }

    /// Check whether `request` may join at the rear of the host's platoon.
    fn evaluate_join(
        &self,
        request: &MobilityRequest,
        join: &JoinParams,
    ) -> Result<RoutePosition, JoinRejection> {
        if !matches!(self.state, PlatoonState::Standby | PlatoonState::Leader) {
            return Err(JoinRejection::Busy(self.state));
        }

        let rejoining = self.roster.contains(&request.sender);
        // Sizes come off the wire; saturate so an absurd one reads as full.
        let size = (self.roster.len() + 1 - usize::from(rejoining)).saturating_add(join.size);
        if size > self.config.max_platoon_size {
            return Err(JoinRejection::PlatoonFull {
                size,
                max: self.config.max_platoon_size,
            });
        }

        let host_downtrack = self
            .host_downtrack()
            .ok_or(JoinRejection::HostPositionUnknown)?;
        let rear = self
            .roster
            .iter()
            .filter(|m| m.static_id != request.sender)
            .last()
            .map_or(host_downtrack, |m| m.downtrack);
        let gap = rear - join.downtrack;
        if !(self.config.min_gap..=self.config.max_gap).contains(&gap) {
            return Err(JoinRejection::GapOutOfRange {
                gap,
                min: self.config.min_gap,
                max: self.config.max_gap,
            });
        }

        if join.speed < self.config.min_join_speed {
            return Err(JoinRejection::TooSlow {
                speed: join.speed,
                min: self.config.min_join_speed,
            });
        }

        let difference = (join.speed - self.host.speed).abs();
        if difference > self.config.max_speed_difference {
            return Err(JoinRejection::SpeedMismatch {
                difference,
                max: self.config.max_speed_difference,
            });
        }

        let position = self
            .georeference
            .to_route(&request.location)
            .map_err(|e| JoinRejection::Unlocatable(e.to_string()))?;
        if position.crosstrack.abs() > self.config.max_crosstrack {
            return Err(JoinRejection::OffLane {
                offset: position.crosstrack,
                max: self.config.max_crosstrack,
            });
        }

        Ok(position)
    }

    fn on_join_request(&mut self, request: MobilityRequest) -> Vec<Action> {
        let Some(join) = request.join_params().cloned() else {
            return vec![];
        };

        match self.evaluate_join(&request, &join) {
            Ok(position) => {
                if self.state == PlatoonState::Standby {
                    self.platoon_id = Some(self.mint_platoon_id());
                    self.leader_id = Some(self.host_id.clone());
                    self.transition(PlatoonState::Leader, "join request accepted");
                }
                let size = self.roster.update_or_add(
                    &request.sender,
                    join.speed,
                    join.downtrack,
                    join.speed,
                    position.crosstrack,
                    self.now,
                );
                self.roster
                    .set_reported_state(&request.sender, PlatoonState::Follower);
                info!(
                    host = %self.host_id,
                    joiner = %request.sender,
                    roster_size = size,
                    "Accepted vehicle at platoon rear"
                );
                vec![self.respond(&request, true)]
            }
            Err(reason) => {
                warn!(
                    host = %self.host_id,
                    joiner = %request.sender,
                    %reason,
                    "Rejecting join request"
                );
                vec![self.respond(&request, false)]
            }
        }
    }

    fn on_leadership_claim(&mut self, request: MobilityRequest) -> Vec<Action> {
        let Some(status) = request.status_params().cloned() else {
            return vec![];
        };
        if !self.roster.contains(&request.sender) {
            debug!(
                host = %self.host_id,
                claimant = %request.sender,
                "Ignoring leadership claim from outside the platoon"
            );
            return vec![];
        }

        let offset = self
            .roster
            .get(&request.sender)
            .map_or(0.0, |m| m.vehicle_offset);
        self.roster.update_or_add(
            &request.sender,
            status.command_speed,
            status.downtrack,
            status.speed,
            offset,
            self.now,
        );
        self.roster
            .set_reported_state(&request.sender, PlatoonState::CandidateLeader);

        let ahead = self.is_ahead_of_host(Some(status.downtrack));
        let mut actions = Vec::new();
        match self.state {
            PlatoonState::Follower if ahead => {
                self.adopt_leader(request.sender.clone(), None, "leadership claim accepted");
            }
            PlatoonState::CandidateLeader if ahead => {
                actions.extend(self.abandon_negotiation());
                self.adopt_leader(request.sender.clone(), None, "yielded to predecessor claim");
            }
            PlatoonState::Leader if ahead => {
                error!(
                    host = %self.host_id,
                    claimant = %request.sender,
                    "Leadership claim from ahead of the leader"
                );
                self.adopt_leader(request.sender.clone(), None, "yielded to predecessor claim");
            }
            _ => {
                warn!(
                    host = %self.host_id,
                    claimant = %request.sender,
                    state = %self.state,
                    "Rejecting leadership claim"
                );
                actions.push(self.respond(&request, false));
                return actions;
            }
        }
        actions.push(self.respond(&request, true));
        actions
    }

    fn on_departure(&mut self, request: MobilityRequest) -> Vec<Action> {
        if self.state != PlatoonState::Leader {
            debug!(
                host = %self.host_id,
                sender = %request.sender,
                state = %self.state,
                "Departure notice while not leading"
            );
            return vec![self.respond(&request, false)];
        }
        if self.roster.remove(&request.sender).is_some() {
            info!(
                host = %self.host_id,
                member = %request.sender,
                roster_size = self.roster.len(),
                "Member left platoon"
            );
        }
        vec![self.respond(&request, true)]
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Operations
    // ═══════════════════════════════════════════════════════════════════════════

    /// Whether a broadcast comes from the host's own platoon.
    fn is_own_platoon(&self, operation: &MobilityOperation) -> bool {
        if matches!(
            self.state,
            PlatoonState::Standby | PlatoonState::CandidateFollower
        ) {
            return false;
        }
        let same_platoon =
            operation.platoon_id.is_some() && operation.platoon_id == self.platoon_id;
        let from_leader = self.state == PlatoonState::Follower
            && self.leader_id.as_ref() == Some(&operation.sender);
        same_platoon || from_leader
    }

    fn on_operation(&mut self, operation: MobilityOperation) -> Vec<Action> {
        self.neighbors.observe(&operation, self.now);
        if !self.is_own_platoon(&operation) {
            return vec![];
        }

        match &operation.params {
            OperationParams::Status(status) => {
                self.on_platoon_status(&operation, status);
                vec![]
            }
            OperationParams::Info(_) => self.on_platoon_info(&operation),
        }
    }

    fn on_platoon_status(&mut self, operation: &MobilityOperation, status: &StatusParams) {
        let sender = &operation.sender;
        let previous = self.roster.get(sender).map(|m| (m.vehicle_offset, m.reported_state));
        let offset = previous.map_or(0.0, |(offset, _)| offset);
        self.roster.update_or_add(
            sender,
            status.command_speed,
            status.downtrack,
            status.speed,
            offset,
            self.now,
        );

        let role = if self.leader_id.as_ref() == Some(sender) {
            PlatoonState::Leader
        } else {
            match previous.and_then(|(_, role)| role) {
                // Kept until the claim resolves into an INFO or a new leader.
                Some(PlatoonState::CandidateLeader) => PlatoonState::CandidateLeader,
                _ => PlatoonState::Follower,
            }
        };
        self.roster.set_reported_state(sender, role);

        if self.state == PlatoonState::Follower
            && self.leader_id.as_ref() == Some(sender)
            && operation.platoon_id.is_some()
            && operation.platoon_id != self.platoon_id
        {
            info!(host = %self.host_id, platoon = ?operation.platoon_id, "Adopted platoon id from leader");
            self.platoon_id = operation.platoon_id.clone();
        }
    }

    fn on_platoon_info(&mut self, operation: &MobilityOperation) -> Vec<Action> {
        let sender = operation.sender.clone();
        self.ensure_member(&sender);
        self.roster.touch(&sender, self.now);
        self.roster
            .set_reported_state(&sender, PlatoonState::Leader);

        if self.leader_id.as_ref() == Some(&sender) {
            if self.state == PlatoonState::Follower
                && operation.platoon_id.is_some()
                && operation.platoon_id != self.platoon_id
            {
                info!(host = %self.host_id, platoon = ?operation.platoon_id, "Adopted platoon id from leader");
                self.platoon_id = operation.platoon_id.clone();
            }
            return vec![];
        }

        let ahead = self.is_ahead_of_host(self.peer_downtrack(&sender));
        if !ahead {
            debug!(
                host = %self.host_id,
                sender = %sender,
                "Ignoring platoon info from a leader behind the host"
            );
            return vec![];
        }

        let platoon_id = operation.platoon_id.clone();
        match self.state {
            PlatoonState::Follower => {
                self.adopt_leader(sender, platoon_id, "new leader ahead");
                vec![]
            }
            PlatoonState::Leader => {
                error!(
                    host = %self.host_id,
                    other = %sender,
                    "Another leader of the platoon is ahead of the host"
                );
                self.adopt_leader(sender, platoon_id, "yielded to leader ahead");
                vec![]
            }
            PlatoonState::CandidateLeader => {
                let actions = self.abandon_negotiation();
                self.adopt_leader(sender, platoon_id, "yielded to leader ahead");
                actions
            }
            _ => vec![],
        }
    }

    fn on_message(&mut self, raw: RawMessage) -> Vec<Action> {
        let message = match wire::decode(&raw) {
            Ok(message) => message,
            Err(e) => {
                debug!(
                    host = %self.host_id,
                    channel = %raw.channel(),
                    sender = %raw.header().sender_id,
                    error = %e,
                    "Dropping malformed coordination message"
                );
                return vec![];
            }
        };

        if *message.sender() == self.host_id {
            return vec![];
        }

        match message {
            CoordinationMessage::Request(request) => self.on_request(request),
            CoordinationMessage::Response(response) => self.on_response(response),
            CoordinationMessage::Operation(operation) => self.on_operation(operation),
        }
    }
}

impl StateMachine for PlatoonStateMachine {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::HostStateUpdated {
                location,
                speed,
                command_speed,
            } => self.on_host_state(location, speed, command_speed),
            event if !self.active => {
                debug!(host = %self.host_id, event = event.type_name(), "Ignoring event while inactive");
                vec![]
            }
            Event::SpinTimer => self.on_spin(),
            Event::NegotiationTimeout { epoch } => self.on_negotiation_timeout(epoch),
            Event::MessageReceived(raw) => self.on_message(raw),
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}

impl Lifecycle for PlatoonStateMachine {
    type Config = PlatoonConfig;
    type Error = ConfigError;

    fn on_configure(&mut self, config: PlatoonConfig) -> Result<(), ConfigError> {
        if self.active {
            return Err(ConfigError::Active);
        }
        config.validate()?;
        self.negotiation.set_timeout(config.negotiation_timeout);
        self.config = config;
        info!(host = %self.host_id, "Platoon coordination configured");
        Ok(())
    }

    fn on_activate(&mut self) -> Vec<Action> {
        if self.active {
            debug!(host = %self.host_id, "Already active");
            return vec![];
        }
        self.active = true;
        self.state = PlatoonState::Standby;
        self.transitions = 0;
        self.failed_negotiations = 0;
        self.next_attempt_at = self.now;
        info!(host = %self.host_id, "Platoon coordination activated");

        vec![Action::SetRepeatingTimer {
            id: TimerId::Spin,
            period: self.config.spin_period,
        }]
    }

    fn on_deactivate(&mut self) -> Vec<Action> {
        if !self.active {
            return vec![];
        }
        let mut actions = Vec::new();

        if self.state == PlatoonState::Follower {
            match (self.leader_id.clone(), self.host_status()) {
                (Some(leader), Some(status)) => {
                    let plan_id = self.next_plan_id();
                    info!(host = %self.host_id, leader = %leader, "Leaving platoon");
                    actions.push(Self::publish(OutboundMessage::Request(
                        MobilityRequest::departure(
                            self.host_id.clone(),
                            leader,
                            plan_id,
                            status,
                            self.host_location(),
                            self.timestamp_ms(),
                        ),
                    )));
                }
                _ => warn!(host = %self.host_id, "Leaving platoon without notifying the leader"),
            }
        }

        actions.extend(self.abandon_negotiation());
        actions.push(Action::CancelTimer { id: TimerId::Spin });
        self.transition(PlatoonState::Standby, "deactivated");
        self.neighbors.clear();
        self.active = false;
        info!(host = %self.host_id, "Platoon coordination deactivated");

        actions.push(Action::PublishStatus {
            info: self.status(),
        });
        actions
    }

    fn on_shutdown(&mut self) -> Vec<Action> {
        info!(host = %self.host_id, "Platoon coordination shutting down");
        self.on_deactivate()
    }
}
