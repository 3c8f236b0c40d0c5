//! Tokio-backed timer service.

use crate::runner::Intake;
use parking_lot::Mutex;
use platoon_core::{TimerId, TimerService};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Timer service that delivers firings into the runner's intake channel.
///
/// Each armed timer is a tokio task. Re-arming or cancelling aborts the
/// task; a firing already queued in the intake is not recalled, which is
/// harmless because negotiation timeouts carry their epoch.
#[derive(Clone)]
pub struct TokioTimers {
    intake: mpsc::Sender<Intake>,
    tasks: Arc<Mutex<HashMap<TimerId, JoinHandle<()>>>>,
}

impl TokioTimers {
    pub fn new(intake: mpsc::Sender<Intake>) -> Self {
        Self {
            intake,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn install(&self, id: TimerId, task: JoinHandle<()>) {
        if let Some(previous) = self.tasks.lock().insert(id, task) {
            previous.abort();
        }
    }

    /// Number of armed timers, finished one-shots included until re-armed.
    pub fn armed(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Abort every timer.
    pub fn cancel_all(&self) {
        for (_, task) in self.tasks.lock().drain() {
            task.abort();
        }
    }
}

impl TimerService for TokioTimers {
    fn schedule_once(&mut self, id: TimerId, delay: Duration) {
        trace!(timer = ?id, ?delay, "Arming timer");
        let intake = self.intake.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = intake.send(Intake::Event(id.event())).await;
        });
        self.install(id, task);
    }

    fn schedule_repeating(&mut self, id: TimerId, period: Duration) {
        trace!(timer = ?id, ?period, "Arming repeating timer");
        let intake = self.intake.clone();
        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if intake.send(Intake::Event(id.event())).await.is_err() {
                    break;
                }
            }
        });
        self.install(id, task);
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some(task) = self.tasks.lock().remove(&id) {
            trace!(timer = ?id, "Cancelling timer");
            task.abort();
        }
    }
}
