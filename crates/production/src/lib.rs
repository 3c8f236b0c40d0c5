//! Production runner for platoon coordination.
//!
//! Wraps the synchronous [`PlatoonStateMachine`](platoon_coordination::PlatoonStateMachine)
//! in a tokio task:
//!
//! - [`NodeRunner`] drains a single intake channel and executes actions
//! - [`TokioTimers`] implements [`TimerService`](platoon_core::TimerService) with tokio tasks
//! - [`Transport`] is the seam to the V2X channel; [`LocalBus`] is an in-process bus
//! - [`NodeConfig`] loads the TOML node configuration
//! - [`init_tracing`] installs the tracing subscriber

mod config;
mod rate_limiter;
mod runner;
mod telemetry;
mod timers;
mod transport;

pub use config::{CoordinationSection, LoggingSection, NodeConfig, RunnerSection};
pub use rate_limiter::{InboundRateLimiter, RateLimitConfig};
pub use runner::{
    Intake, LifecycleCommand, NodeError, NodeHandle, NodeRunner, RunnerSettings, SpawnedNode,
};
pub use telemetry::{env_filter, init_tracing, LogFormat};
pub use timers::TokioTimers;
pub use transport::{LocalBus, Transport, TransportError};
