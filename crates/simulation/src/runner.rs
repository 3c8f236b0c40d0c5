//! Deterministic simulation runner.

use crate::event_queue::EventKey;
use crate::network::{NetworkConfig, SimulatedNetwork};
use crate::road::StraightRoad;
use crate::NodeIndex;
use platoon_coordination::{ConfigError, PlatoonConfig, PlatoonStateMachine};
use platoon_core::{Action, Event, Georeference, Lifecycle, PlatooningInfo, StateMachine, TimerId};
use platoon_types::{EcefPoint, RoutePosition, VehicleId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors building a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("Invalid coordination config: {0}")]
    Config(#[from] ConfigError),

    #[error("Vehicle {0} appears more than once")]
    DuplicateVehicle(VehicleId),
}

/// Initial placement of a simulated vehicle.
///
/// Vehicles drive at a constant speed along the road.
#[derive(Debug, Clone)]
pub struct VehicleSpec {
    pub id: VehicleId,
    /// Downtrack distance at time zero (m).
    pub downtrack: f64,
    /// Lateral offset from the road centre (m).
    pub crosstrack: f64,
    /// Constant speed (m/s).
    pub speed: f64,
}

impl VehicleSpec {
    pub fn new(id: &str, downtrack: f64, speed: f64) -> Self {
        Self {
            id: VehicleId::from(id),
            downtrack,
            crosstrack: 0.0,
            speed,
        }
    }

    pub fn with_crosstrack(mut self, crosstrack: f64) -> Self {
        self.crosstrack = crosstrack;
        self
    }
}

/// Counters collected during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationStats {
    pub events_processed: u64,
    pub messages_sent: u64,
    pub messages_delivered: u64,
    pub messages_dropped: u64,
    pub timers_set: u64,
    pub timers_cancelled: u64,
}

struct SimVehicle {
    machine: PlatoonStateMachine,
    spec: VehicleSpec,
    status: Option<PlatooningInfo>,
}

impl SimVehicle {
    fn downtrack_at(&self, now: Duration) -> f64 {
        self.spec.downtrack + self.spec.speed * now.as_secs_f64()
    }
}

/// Runs a set of vehicles against a simulated radio channel.
///
/// Every vehicle owns its own [`PlatoonStateMachine`]. Timers, host pose
/// updates and message deliveries are all events in one ordered queue, so a
/// run is fully determined by its inputs and the seed.
pub struct SimulationRunner {
    queue: BTreeMap<EventKey, Event>,
    sequence: u64,
    now: Duration,
    vehicles: Vec<SimVehicle>,
    network: SimulatedNetwork,
    road: StraightRoad,
    /// Next pending firing of every armed timer.
    timers: HashMap<(NodeIndex, TimerId), EventKey>,
    /// Periods of repeating timers.
    repeating: HashMap<(NodeIndex, TimerId), Duration>,
    host_update_period: Duration,
    stats: SimulationStats,
}

impl SimulationRunner {
    /// Build a simulation and activate every vehicle at time zero.
    pub fn new(
        specs: Vec<VehicleSpec>,
        config: PlatoonConfig,
        network: NetworkConfig,
        seed: u64,
    ) -> Result<Self, SimulationError> {
        let mut seen = BTreeSet::new();
        for spec in &specs {
            if !seen.insert(spec.id.clone()) {
                return Err(SimulationError::DuplicateVehicle(spec.id.clone()));
            }
        }

        let road = StraightRoad::default();
        let georeference: Arc<dyn Georeference> = Arc::new(road);
        let host_update_period = config.spin_period / 2;

        let vehicles = specs
            .into_iter()
            .map(|spec| {
                let machine =
                    PlatoonStateMachine::new(spec.id.clone(), config.clone(), georeference.clone())?;
                Ok(SimVehicle {
                    machine,
                    spec,
                    status: None,
                })
            })
            .collect::<Result<Vec<_>, SimulationError>>()?;

        let mut runner = Self {
            queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            vehicles,
            network: SimulatedNetwork::new(network, seed),
            road,
            timers: HashMap::new(),
            repeating: HashMap::new(),
            host_update_period,
            stats: SimulationStats::default(),
        };

        for node in 0..runner.vehicles.len() as NodeIndex {
            runner.schedule(Duration::ZERO, node, Self::host_placeholder());
            runner.activate(node);
        }
        Ok(runner)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Number of vehicles.
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    pub fn machine(&self, node: NodeIndex) -> &PlatoonStateMachine {
        &self.vehicles[node as usize].machine
    }

    /// Last status snapshot the vehicle published.
    pub fn status(&self, node: NodeIndex) -> Option<&PlatooningInfo> {
        self.vehicles[node as usize].status.as_ref()
    }

    pub fn node_of(&self, id: &VehicleId) -> Option<NodeIndex> {
        self.vehicles
            .iter()
            .position(|v| v.spec.id == *id)
            .map(|i| i as NodeIndex)
    }

    /// Current downtrack distance of a vehicle.
    pub fn downtrack(&self, node: NodeIndex) -> f64 {
        self.vehicles[node as usize].downtrack_at(self.now)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Control
    // ═══════════════════════════════════════════════════════════════════════════

    /// Cut a vehicle's radio. Deliveries already in flight still arrive.
    pub fn isolate(&mut self, node: NodeIndex) {
        debug!(node, time = ?self.now, "Isolating vehicle");
        self.network.isolate(node);
    }

    pub fn reconnect(&mut self, node: NodeIndex) {
        debug!(node, time = ?self.now, "Reconnecting vehicle");
        self.network.reconnect(node);
    }

    pub fn activate(&mut self, node: NodeIndex) {
        let vehicle = &mut self.vehicles[node as usize];
        vehicle.machine.set_time(self.now);
        let actions = vehicle.machine.on_activate();
        self.apply_all(node, actions);
    }

    pub fn deactivate(&mut self, node: NodeIndex) {
        let vehicle = &mut self.vehicles[node as usize];
        vehicle.machine.set_time(self.now);
        let actions = vehicle.machine.on_deactivate();
        self.apply_all(node, actions);
    }

    /// Process every event scheduled up to and including `end`.
    pub fn run_until(&mut self, end: Duration) {
        while let Some((key, _)) = self.queue.first_key_value() {
            if key.time > end {
                break;
            }
            if let Some((key, event)) = self.queue.pop_first() {
                self.process(key, event);
            }
        }
        self.now = end;
    }

    /// Process the next event. Returns false when the queue is empty.
    pub fn step(&mut self) -> bool {
        match self.queue.pop_first() {
            Some((key, event)) => {
                self.process(key, event);
                true
            }
            None => false,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Event processing
    // ═══════════════════════════════════════════════════════════════════════════

    fn host_placeholder() -> Event {
        Event::HostStateUpdated {
            location: EcefPoint::default(),
            speed: 0.0,
            command_speed: 0.0,
        }
    }

    /// Host pose of `node` at the current time.
    fn host_event(&self, node: NodeIndex) -> Event {
        let vehicle = &self.vehicles[node as usize];
        let position = RoutePosition::new(vehicle.downtrack_at(self.now), vehicle.spec.crosstrack);
        // Past the end of the road the raw point is still reported; the
        // machine then sees an off-route host.
        let location = self
            .road
            .to_ecef(&position)
            .unwrap_or_else(|_| self.road.point(position.downtrack, position.crosstrack));
        Event::HostStateUpdated {
            location,
            speed: vehicle.spec.speed,
            command_speed: vehicle.spec.speed,
        }
    }

    fn timer_of(event: &Event) -> Option<TimerId> {
        match event {
            Event::SpinTimer => Some(TimerId::Spin),
            Event::NegotiationTimeout { epoch } => Some(TimerId::Negotiation(*epoch)),
            _ => None,
        }
    }

    fn schedule(&mut self, time: Duration, node: NodeIndex, event: Event) -> EventKey {
        self.sequence += 1;
        let key = EventKey::new(time, &event, node, self.sequence);
        self.queue.insert(key, event);
        key
    }

    fn process(&mut self, key: EventKey, event: Event) {
        self.now = key.time;
        let node = key.node;

        let event = match event {
            Event::HostStateUpdated { .. } => {
                self.schedule(
                    self.now + self.host_update_period,
                    node,
                    Self::host_placeholder(),
                );
                self.host_event(node)
            }
            event => {
                if let Some(id) = Self::timer_of(&event) {
                    self.timers.remove(&(node, id));
                    if let Some(period) = self.repeating.get(&(node, id)).copied() {
                        let next = self.schedule(self.now + period, node, event.clone());
                        self.timers.insert((node, id), next);
                    }
                }
                event
            }
        };

        trace!(node, time = ?self.now, event = event.type_name(), "Processing event");
        let vehicle = &mut self.vehicles[node as usize];
        vehicle.machine.set_time(self.now);
        let actions = vehicle.machine.handle(event);
        self.stats.events_processed += 1;
        self.apply_all(node, actions);
    }

    fn apply_all(&mut self, node: NodeIndex, actions: Vec<Action>) {
        for action in actions {
            self.apply(node, action);
        }
    }

    fn apply(&mut self, node: NodeIndex, action: Action) {
        match action {
            Action::Publish { message } => {
                let raw = message.to_raw();
                let positions: Vec<f64> = self
                    .vehicles
                    .iter()
                    .map(|v| v.downtrack_at(self.now))
                    .collect();
                let (deliveries, lost) = self.network.deliveries(node, &positions);

                self.stats.messages_sent += 1;
                self.stats.messages_dropped += lost;
                trace!(
                    node,
                    kind = message.type_name(),
                    receivers = deliveries.len(),
                    lost,
                    "Broadcast"
                );

                for (to, delay) in deliveries {
                    self.schedule(self.now + delay, to, Event::MessageReceived(raw.clone()));
                    self.stats.messages_delivered += 1;
                }
            }
            Action::SetTimer { id, duration } => {
                self.cancel_timer(node, id);
                self.repeating.remove(&(node, id));
                let key = self.schedule(self.now + duration, node, id.event());
                self.timers.insert((node, id), key);
                self.stats.timers_set += 1;
            }
            Action::SetRepeatingTimer { id, period } => {
                self.cancel_timer(node, id);
                self.repeating.insert((node, id), period);
                let key = self.schedule(self.now + period, node, id.event());
                self.timers.insert((node, id), key);
                self.stats.timers_set += 1;
            }
            Action::CancelTimer { id } => {
                self.repeating.remove(&(node, id));
                self.cancel_timer(node, id);
                self.stats.timers_cancelled += 1;
            }
            Action::PublishStatus { info } => {
                self.vehicles[node as usize].status = Some(info);
            }
        }
    }

    fn cancel_timer(&mut self, node: NodeIndex, id: TimerId) {
        if let Some(key) = self.timers.remove(&(node, id)) {
            self.queue.remove(&key);
        }
    }
}
