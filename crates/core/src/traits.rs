//! Core traits for the state machine and its collaborators.

use crate::{Action, Event, TimerId};
use platoon_types::{EcefPoint, RoutePosition};
use std::time::Duration;
use thiserror::Error;

/// A state machine that processes events.
///
/// The coordination logic is implemented as a state machine that is:
///
/// - **Synchronous**: No async, no `.await`
/// - **Deterministic**: Same state + event = same actions
/// - **Pure-ish**: Mutates self, but performs no I/O
///
/// # Example
///
/// ```ignore
/// impl StateMachine for PlatoonStateMachine {
///     fn handle(&mut self, event: Event) -> Vec<Action> {
///         match event {
///             Event::SpinTimer => self.on_spin(),
///             Event::NegotiationTimeout { epoch } => self.on_negotiation_timeout(epoch),
///             // ... etc
///         }
///     }
///
///     fn set_time(&mut self, now: Duration) {
///         self.now = now;
///     }
/// }
/// ```
pub trait StateMachine {
    /// Process an event, returning actions to perform.
    ///
    /// # Guarantees
    ///
    /// - **Synchronous**: This method never blocks or awaits
    /// - **Deterministic**: Given the same state and event, always returns the same actions
    /// - **No I/O**: All I/O is performed by the runner via the returned actions
    ///
    /// Events must be delivered one at a time; each is processed to
    /// completion before the next one starts.
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Set the current time.
    ///
    /// Called by the runner before each `handle()` call to provide the
    /// current simulation or wall-clock time.
    fn set_time(&mut self, now: Duration);

    /// Get the current time.
    ///
    /// Returns the time that was last set via `set_time()`.
    fn now(&self) -> Duration;
}

/// Lifecycle hooks driven by the hosting process.
///
/// The host owns the lifecycle; the coordination module is a plain stateful
/// object that reacts to these explicit calls.
pub trait Lifecycle {
    type Config;
    type Error;

    /// Install a new configuration. Only allowed while inactive.
    fn on_configure(&mut self, config: Self::Config) -> Result<(), Self::Error>;

    /// Start participating in the protocol.
    fn on_activate(&mut self) -> Vec<Action>;

    /// Stop participating; leaves any platoon.
    fn on_deactivate(&mut self) -> Vec<Action>;

    /// Final teardown before the process exits.
    fn on_shutdown(&mut self) -> Vec<Action>;
}

/// Errors from the georeference collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("No georeference loaded")]
    NoReference,

    #[error("Point is off the route: {0}")]
    OffRoute(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Conversions between ECEF coordinates and route-relative positions.
pub trait Georeference: Send + Sync {
    /// Project an ECEF point onto the route.
    fn to_route(&self, point: &EcefPoint) -> Result<RoutePosition, GeoError>;

    /// Convert a route position back to ECEF.
    fn to_ecef(&self, position: &RoutePosition) -> Result<EcefPoint, GeoError>;
}

/// Scheduler used by runners to execute timer actions.
///
/// Firing a timer delivers the matching [`Event`] (see [`TimerId::event`]).
/// Cancelling only prevents future firings.
pub trait TimerService {
    /// Fire `id` once after `delay`, replacing a pending timer with the same id.
    fn schedule_once(&mut self, id: TimerId, delay: Duration);

    /// Fire `id` every `period` until cancelled.
    fn schedule_repeating(&mut self, id: TimerId, period: Duration);

    /// Cancel `id` if pending.
    fn cancel(&mut self, id: TimerId);
}
