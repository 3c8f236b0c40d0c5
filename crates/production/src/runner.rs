//! Async node runner.
//!
//! One tokio task owns the [`PlatoonStateMachine`] and drains a single
//! intake channel. Inbound messages, host updates, timer firings, lifecycle
//! commands and status queries all arrive through it, so every entry point
//! into the state machine is serialized.
//!
//! ```text
//!  transport ──► inbound task ──┐
//!  (rate limited, own echo      │
//!   filtered)                   ▼
//!  NodeHandle ─────────────► intake (mpsc) ──► NodeRunner ──► Actions
//!  TokioTimers ─────────────────┘                    │
//!                                                     ├─► Transport::publish
//!                                                     ├─► TokioTimers
//!                                                     └─► watch<PlatooningInfo>
//! ```

use crate::rate_limiter::{InboundRateLimiter, RateLimitConfig};
use crate::timers::TokioTimers;
use crate::transport::Transport;
use platoon_coordination::{ConfigError, PlatoonConfig, PlatoonStateMachine};
use platoon_core::{Action, Event, Lifecycle, PlatooningInfo, StateMachine, TimerService};
use platoon_messages::RawMessage;
use platoon_types::{EcefPoint, VehicleId};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Errors surfaced to callers of a [`NodeHandle`].
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Node runner has stopped")]
    Stopped,

    #[error("No answer from node runner within {0:?}")]
    Timeout(Duration),

    #[error("Configuration rejected: {0}")]
    Config(#[from] ConfigError),
}

/// Lifecycle commands forwarded to the state machine.
#[derive(Debug)]
pub enum LifecycleCommand {
    Configure {
        config: PlatoonConfig,
        reply: oneshot::Sender<Result<(), ConfigError>>,
    },
    Activate,
    Deactivate,
    /// Deactivate and stop the runner.
    Shutdown,
}

/// Everything the runner task can be asked to do.
#[derive(Debug)]
pub enum Intake {
    Event(Event),
    Lifecycle(LifecycleCommand),
    QueryStatus(oneshot::Sender<PlatooningInfo>),
}

/// Runner plumbing settings.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub intake_capacity: usize,
    /// Bound on how long a handle waits for the runner to answer.
    pub service_timeout: Duration,
    pub rate_limit: RateLimitConfig,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            intake_capacity: 256,
            service_timeout: PlatoonConfig::default().service_timeout,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Cloneable handle to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    host_id: VehicleId,
    intake: mpsc::Sender<Intake>,
    status: watch::Receiver<PlatooningInfo>,
    service_timeout: Duration,
}

impl NodeHandle {
    pub fn host_id(&self) -> &VehicleId {
        &self.host_id
    }

    async fn send(&self, intake: Intake) -> Result<(), NodeError> {
        self.intake.send(intake).await.map_err(|_| NodeError::Stopped)
    }

    /// Feed the latest host pose.
    pub async fn update_host(
        &self,
        location: EcefPoint,
        speed: f64,
        command_speed: f64,
    ) -> Result<(), NodeError> {
        self.send(Intake::Event(Event::HostStateUpdated {
            location,
            speed,
            command_speed,
        }))
        .await
    }

    pub async fn activate(&self) -> Result<(), NodeError> {
        self.send(Intake::Lifecycle(LifecycleCommand::Activate)).await
    }

    pub async fn deactivate(&self) -> Result<(), NodeError> {
        self.send(Intake::Lifecycle(LifecycleCommand::Deactivate))
            .await
    }

    /// Deactivate and stop the runner task.
    pub async fn shutdown(&self) -> Result<(), NodeError> {
        self.send(Intake::Lifecycle(LifecycleCommand::Shutdown)).await
    }

    /// Replace the coordination config. Rejected while active.
    pub async fn configure(&self, config: PlatoonConfig) -> Result<(), NodeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Intake::Lifecycle(LifecycleCommand::Configure { config, reply }))
            .await?;
        Ok(self.await_reply(rx).await??)
    }

    /// Ask the runner for a fresh status snapshot.
    pub async fn query_status(&self) -> Result<PlatooningInfo, NodeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Intake::QueryStatus(reply)).await?;
        self.await_reply(rx).await
    }

    async fn await_reply<T>(&self, rx: oneshot::Receiver<T>) -> Result<T, NodeError> {
        match tokio::time::timeout(self.service_timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(NodeError::Stopped),
            Err(_) => Err(NodeError::Timeout(self.service_timeout)),
        }
    }

    /// Last snapshot the state machine published.
    pub fn status(&self) -> PlatooningInfo {
        self.status.borrow().clone()
    }

    /// Receiver that is notified on every published snapshot.
    pub fn subscribe_status(&self) -> watch::Receiver<PlatooningInfo> {
        self.status.clone()
    }
}

/// Owns the state machine and executes its actions.
pub struct NodeRunner {
    machine: PlatoonStateMachine,
    transport: Arc<dyn Transport>,
    timers: TokioTimers,
    intake: mpsc::Receiver<Intake>,
    status: watch::Sender<PlatooningInfo>,
    started: Instant,
}

/// Tasks of a spawned node.
pub struct SpawnedNode {
    pub handle: NodeHandle,
    /// Completes after a shutdown command.
    pub runner: JoinHandle<()>,
    pub inbound: JoinHandle<()>,
}

impl NodeRunner {
    /// Spawn the runner and its inbound task on the current runtime.
    ///
    /// `inbound` is the receiving side of the channel `transport` publishes
    /// on. The node starts inactive.
    pub fn spawn(
        machine: PlatoonStateMachine,
        transport: Arc<dyn Transport>,
        inbound: broadcast::Receiver<RawMessage>,
        settings: RunnerSettings,
    ) -> SpawnedNode {
        let host_id = machine.host_id().clone();
        let (intake_tx, intake_rx) = mpsc::channel(settings.intake_capacity);
        let (status_tx, status_rx) = watch::channel(machine.status());

        let runner = NodeRunner {
            machine,
            transport,
            timers: TokioTimers::new(intake_tx.clone()),
            intake: intake_rx,
            status: status_tx,
            started: Instant::now(),
        };

        let inbound = tokio::spawn(forward_inbound(
            host_id.clone(),
            inbound,
            intake_tx.clone(),
            InboundRateLimiter::new(settings.rate_limit),
        ));
        let runner = tokio::spawn(runner.run());

        SpawnedNode {
            handle: NodeHandle {
                host_id,
                intake: intake_tx,
                status: status_rx,
                service_timeout: settings.service_timeout,
            },
            runner,
            inbound,
        }
    }

    async fn run(mut self) {
        info!(host = %self.machine.host_id(), "Node runner started");

        while let Some(intake) = self.intake.recv().await {
            self.machine.set_time(self.started.elapsed());

            let actions = match intake {
                Intake::Event(event) => {
                    trace!(event = event.type_name(), "Handling event");
                    self.machine.handle(event)
                }
                Intake::QueryStatus(reply) => {
                    let _ = reply.send(self.machine.status());
                    continue;
                }
                Intake::Lifecycle(LifecycleCommand::Configure { config, reply }) => {
                    let _ = reply.send(self.machine.on_configure(config));
                    continue;
                }
                Intake::Lifecycle(LifecycleCommand::Activate) => self.machine.on_activate(),
                Intake::Lifecycle(LifecycleCommand::Deactivate) => {
                    self.machine.on_deactivate()
                }
                Intake::Lifecycle(LifecycleCommand::Shutdown) => {
                    let actions = self.machine.on_shutdown();
                    self.execute(actions);
                    break;
                }
            };
            self.execute(actions);
        }

        self.timers.cancel_all();
        info!(host = %self.machine.host_id(), "Node runner stopped");
    }

    fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Publish { message } => {
                    if let Err(e) = self.transport.publish(message.to_raw()) {
                        warn!(
                            host = %self.machine.host_id(),
                            kind = message.type_name(),
                            error = %e,
                            "Failed to publish coordination message"
                        );
                    }
                }
                Action::SetTimer { id, duration } => self.timers.schedule_once(id, duration),
                Action::SetRepeatingTimer { id, period } => {
                    self.timers.schedule_repeating(id, period)
                }
                Action::CancelTimer { id } => self.timers.cancel(id),
                Action::PublishStatus { info } => {
                    self.status.send_replace(info);
                }
            }
        }
    }
}

/// Move transport records into the intake, dropping our own echo and
/// senders over their rate limit.
async fn forward_inbound(
    host_id: VehicleId,
    mut inbound: broadcast::Receiver<RawMessage>,
    intake: mpsc::Sender<Intake>,
    mut limiter: InboundRateLimiter,
) {
    loop {
        let message = match inbound.recv().await {
            Ok(message) => message,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(host = %host_id, skipped, "Inbound channel lagged, messages lost");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let sender = VehicleId::new(message.header().sender_id.as_str());
        if sender == host_id {
            continue;
        }
        if !limiter.check(&sender) {
            debug!(host = %host_id, sender = %sender, "Rate limited inbound message");
            continue;
        }
        if intake
            .send(Intake::Event(Event::MessageReceived(message)))
            .await
            .is_err()
        {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalBus;
    use platoon_core::Georeference;
    use platoon_test_helpers::{decoded, location, raw_join, LinearGeoreference};
    use platoon_messages::{CoordinationMessage, OperationKind};
    use platoon_types::PlatoonState;

    fn spawn_node(bus: &LocalBus, id: &str) -> SpawnedNode {
        let georeference: Arc<dyn Georeference> = Arc::new(LinearGeoreference);
        let machine =
            PlatoonStateMachine::new(VehicleId::from(id), PlatoonConfig::default(), georeference)
                .unwrap();
        NodeRunner::spawn(
            machine,
            Arc::new(bus.clone()),
            bus.subscribe(),
            RunnerSettings::default(),
        )
    }

    /// Drive `handle` along the x axis at 20 m/s from `start`.
    fn drive(handle: NodeHandle, start: f64) -> JoinHandle<()> {
        tokio::spawn(async move {
            let began = Instant::now();
            loop {
                let downtrack = start + 20.0 * began.elapsed().as_secs_f64();
                if handle
                    .update_host(location(downtrack, 0.0), 20.0, 20.0)
                    .await
                    .is_err()
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_publishes_status() {
        let bus = LocalBus::new(64);
        let mut observer = bus.subscribe();
        let node = spawn_node(&bus, "veh-1");
        let _driver = drive(node.handle.clone(), 100.0);

        node.handle.activate().await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        let status = node.handle.query_status().await.unwrap();
        assert_eq!(status.state, PlatoonState::Standby);
        assert_eq!(node.handle.status().host_id, VehicleId::from("veh-1"));

        let message = observer.recv().await.unwrap();
        match decoded(&message) {
            CoordinationMessage::Operation(op) => {
                assert_eq!(op.kind(), OperationKind::Status);
                assert_eq!(op.sender, VehicleId::from("veh-1"));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_nodes_form_platoon() {
        let bus = LocalBus::new(256);
        let front = spawn_node(&bus, "front");
        let rear = spawn_node(&bus, "rear");
        let _d1 = drive(front.handle.clone(), 100.0);
        let _d2 = drive(rear.handle.clone(), 70.0);

        front.handle.activate().await.unwrap();
        rear.handle.activate().await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let leader = front.handle.query_status().await.unwrap();
        let follower = rear.handle.query_status().await.unwrap();
        assert_eq!(leader.state, PlatoonState::Leader);
        assert_eq!(leader.roster_size, 1);
        assert_eq!(follower.state, PlatoonState::Follower);
        assert_eq!(follower.leader_id, Some(VehicleId::from("front")));
        assert_eq!(follower.platoon_id, leader.platoon_id);

        rear.handle.shutdown().await.unwrap();
        rear.runner.await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(front.handle.query_status().await.unwrap().roster_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_rejected_while_active() {
        let bus = LocalBus::new(16);
        let node = spawn_node(&bus, "veh-1");

        let tighter = PlatoonConfig::default().with_gap_range(5.0, 30.0);
        node.handle.configure(tighter.clone()).await.unwrap();

        node.handle.activate().await.unwrap();
        assert!(matches!(
            node.handle.configure(tighter).await,
            Err(NodeError::Config(ConfigError::Active))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_after_shutdown() {
        let bus = LocalBus::new(16);
        let node = spawn_node(&bus, "veh-1");

        node.handle.shutdown().await.unwrap();
        node.runner.await.unwrap();
        assert!(matches!(
            node.handle.query_status().await,
            Err(NodeError::Stopped)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flood_from_one_sender() {
        let bus = LocalBus::new(256);
        let node = spawn_node(&bus, "veh-1");
        let _driver = drive(node.handle.clone(), 100.0);
        node.handle.activate().await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Far more join requests than the default burst, all from one sender.
        for i in 0..500 {
            bus.publish(raw_join("spammer", "veh-1", &format!("p-{i}"), 70.0, 20.0))
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        let status = node.handle.query_status().await.unwrap();
        assert_eq!(status.state, PlatoonState::Leader);
        assert_eq!(status.roster_size, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_snapshot_serializes() {
        let bus = LocalBus::new(16);
        let node = spawn_node(&bus, "veh-1");
        let json = serde_json::to_value(node.handle.status()).unwrap();
        assert_eq!(json["state"], "STANDBY");
        assert_eq!(json["host_id"], "veh-1");
    }
}
