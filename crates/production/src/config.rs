//! Node configuration file.
//!
//! A single TOML document describes one vehicle's coordination node.
//! Durations are given in milliseconds and every field has a default, so an
//! empty file apart from `vehicle_id` is a valid configuration:
//!
//! ```toml
//! vehicle_id = "truck-7"
//!
//! [coordination]
//! spin_period_ms = 100
//! max_gap = 45.0
//!
//! [logging]
//! filter = "platoon_coordination=debug,info"
//! format = "json"
//! ```

use crate::rate_limiter::RateLimitConfig;
use crate::runner::RunnerSettings;
use crate::telemetry::LogFormat;
use anyhow::{bail, Context, Result};
use platoon_coordination::PlatoonConfig;
use platoon_types::VehicleId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Top-level node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Broadcast identity of the host vehicle.
    pub vehicle_id: String,
    pub coordination: CoordinationSection,
    pub runner: RunnerSection,
    pub logging: LoggingSection,
}

/// Protocol tuning, mirrored from [`PlatoonConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinationSection {
    pub spin_period_ms: u64,
    pub negotiation_timeout_ms: u64,
    pub leader_timeout_ms: u64,
    pub member_timeout_ms: u64,
    pub retry_backoff_ms: u64,
    pub service_timeout_ms: u64,
    pub min_gap: f64,
    pub max_gap: f64,
    pub max_speed_difference: f64,
    pub min_join_speed: f64,
    pub max_platoon_size: usize,
    pub max_crosstrack: f64,
}

/// Runner plumbing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerSection {
    /// Capacity of the intake channel.
    pub intake_capacity: usize,
    /// Sustained inbound messages per second accepted from one sender.
    pub rate_limit_per_sec: u32,
    /// Inbound burst accepted from one sender.
    pub rate_limit_burst: u32,
    pub sender_ttl_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

impl Default for CoordinationSection {
    fn default() -> Self {
        let defaults = PlatoonConfig::default();
        Self {
            spin_period_ms: millis(defaults.spin_period),
            negotiation_timeout_ms: millis(defaults.negotiation_timeout),
            leader_timeout_ms: millis(defaults.leader_timeout),
            member_timeout_ms: millis(defaults.member_timeout),
            retry_backoff_ms: millis(defaults.retry_backoff),
            service_timeout_ms: millis(defaults.service_timeout),
            min_gap: defaults.min_gap,
            max_gap: defaults.max_gap,
            max_speed_difference: defaults.max_speed_difference,
            min_join_speed: defaults.min_join_speed,
            max_platoon_size: defaults.max_platoon_size,
            max_crosstrack: defaults.max_crosstrack,
        }
    }
}

impl Default for RunnerSection {
    fn default() -> Self {
        let limits = RateLimitConfig::default();
        Self {
            intake_capacity: 256,
            rate_limit_per_sec: limits.messages_per_sec,
            rate_limit_burst: limits.burst,
            sender_ttl_ms: millis(limits.sender_ttl),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            vehicle_id: String::new(),
            coordination: CoordinationSection::default(),
            runner: RunnerSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl NodeConfig {
    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        debug!(path = %path.display(), vehicle = %config.vehicle_id, "Loaded node config");
        Ok(config)
    }

    /// Parse a configuration document.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse TOML")
    }

    /// Host identity, checked for use inside strategy parameters.
    pub fn vehicle_id(&self) -> Result<VehicleId> {
        let id = VehicleId::new(self.vehicle_id.trim());
        if !id.is_wire_safe() {
            bail!(
                "vehicle_id {:?} must be non-empty and free of '|', ',' and ':'",
                self.vehicle_id
            );
        }
        Ok(id)
    }

    /// Validated coordination config.
    pub fn platoon_config(&self) -> Result<PlatoonConfig> {
        let c = &self.coordination;
        let config = PlatoonConfig {
            spin_period: Duration::from_millis(c.spin_period_ms),
            negotiation_timeout: Duration::from_millis(c.negotiation_timeout_ms),
            leader_timeout: Duration::from_millis(c.leader_timeout_ms),
            member_timeout: Duration::from_millis(c.member_timeout_ms),
            retry_backoff: Duration::from_millis(c.retry_backoff_ms),
            service_timeout: Duration::from_millis(c.service_timeout_ms),
            min_gap: c.min_gap,
            max_gap: c.max_gap,
            max_speed_difference: c.max_speed_difference,
            min_join_speed: c.min_join_speed,
            max_platoon_size: c.max_platoon_size,
            max_crosstrack: c.max_crosstrack,
        };
        config
            .validate()
            .context("invalid [coordination] section")?;
        Ok(config)
    }

    /// Runner settings derived from the `[runner]` and `[coordination]` sections.
    pub fn runner_settings(&self) -> Result<RunnerSettings> {
        let r = &self.runner;
        if r.intake_capacity == 0 {
            bail!("runner.intake_capacity must be positive");
        }
        if r.rate_limit_burst == 0 {
            bail!("runner.rate_limit_burst must be positive");
        }
        Ok(RunnerSettings {
            intake_capacity: r.intake_capacity,
            service_timeout: Duration::from_millis(self.coordination.service_timeout_ms),
            rate_limit: RateLimitConfig {
                messages_per_sec: r.rate_limit_per_sec,
                burst: r.rate_limit_burst,
                sender_ttl: Duration::from_millis(r.sender_ttl_ms),
            },
        })
    }
}
