//! Coordination configuration.

use platoon_messages::MAX_WIRE_PLATOON_SIZE;
use std::time::Duration;
use thiserror::Error;

/// Configuration for platoon coordination.
///
/// Provided as an immutable value at construction; replaced only through
/// `Lifecycle::on_configure` while the instance is inactive.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatoonConfig {
    /// Period of the spin tick (sweeps, broadcasts, status).
    pub spin_period: Duration,

    /// How long a join, merge or leadership negotiation may stay unanswered.
    pub negotiation_timeout: Duration,

    /// Leader silence after which a follower may claim leadership.
    pub leader_timeout: Duration,

    /// Silence after which a roster entry is swept.
    ///
    /// Must not be shorter than `leader_timeout`, so a silent leader is
    /// noticed before it disappears from the roster.
    pub member_timeout: Duration,

    /// Pause after a failed negotiation before trying again.
    pub retry_backoff: Duration,

    /// Timeout for cross-component queries made by the runner.
    pub service_timeout: Duration,

    /// Smallest acceptable gap between the platoon rear and a joiner (m).
    pub min_gap: f64,

    /// Largest acceptable gap between the platoon rear and a joiner (m).
    pub max_gap: f64,

    /// Largest speed difference between joiner and leader (m/s).
    pub max_speed_difference: f64,

    /// Joiners slower than this are refused (m/s).
    pub min_join_speed: f64,

    /// Largest platoon, leader included.
    pub max_platoon_size: usize,

    /// Largest lateral offset of a joiner from the route (m).
    pub max_crosstrack: f64,
}

impl Default for PlatoonConfig {
    fn default() -> Self {
        Self {
            spin_period: Duration::from_millis(100),
            negotiation_timeout: Duration::from_secs(2),
            leader_timeout: Duration::from_secs(1),
            member_timeout: Duration::from_secs(3),
            retry_backoff: Duration::from_secs(1),
            service_timeout: Duration::from_millis(500),
            min_gap: 5.0,
            max_gap: 60.0,
            max_speed_difference: 3.0,
            min_join_speed: 0.0,
            max_platoon_size: 10,
            max_crosstrack: 2.0,
        }
    }
}

impl PlatoonConfig {
    /// Set the negotiation timeout.
    pub fn with_negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = timeout;
        self
    }

    /// Set the leader and member silence timeouts.
    pub fn with_silence_timeouts(mut self, leader: Duration, member: Duration) -> Self {
        self.leader_timeout = leader;
        self.member_timeout = member;
        self
    }

    /// Set the acceptable join gap range.
    pub fn with_gap_range(mut self, min_gap: f64, max_gap: f64) -> Self {
        self.min_gap = min_gap;
        self.max_gap = max_gap;
        self
    }

    /// Set the maximum platoon size.
    pub fn with_max_platoon_size(mut self, size: usize) -> Self {
        self.max_platoon_size = size;
        self
    }

    /// Set the retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("spin_period", self.spin_period),
            ("negotiation_timeout", self.negotiation_timeout),
            ("leader_timeout", self.leader_timeout),
            ("member_timeout", self.member_timeout),
            ("service_timeout", self.service_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }

        if self.member_timeout < self.leader_timeout {
            return Err(ConfigError::MemberTimeoutTooShort {
                member: self.member_timeout,
                leader: self.leader_timeout,
            });
        }

        if !(self.min_gap.is_finite() && self.max_gap.is_finite())
            || self.min_gap < 0.0
            || self.min_gap >= self.max_gap
        {
            return Err(ConfigError::InvalidGapRange {
                min: self.min_gap,
                max: self.max_gap,
            });
        }

        for (name, value) in [
            ("max_speed_difference", self.max_speed_difference),
            ("min_join_speed", self.min_join_speed),
            ("max_crosstrack", self.max_crosstrack),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidThreshold { name, value });
            }
        }

        if self.max_platoon_size < 2 {
            return Err(ConfigError::PlatoonTooSmall(self.max_platoon_size));
        }
        if self.max_platoon_size > MAX_WIRE_PLATOON_SIZE {
            return Err(ConfigError::PlatoonTooLarge(self.max_platoon_size));
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{0} must be non-zero")]
    ZeroDuration(&'static str),

    #[error("member_timeout ({member:?}) must not be shorter than leader_timeout ({leader:?})")]
    MemberTimeoutTooShort { member: Duration, leader: Duration },

    #[error("Invalid gap range [{min}, {max}]")]
    InvalidGapRange { min: f64, max: f64 },

    #[error("{name} must be a non-negative number, got {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("max_platoon_size must be at least 2, got {0}")]
    PlatoonTooSmall(usize),

    #[error("max_platoon_size must be at most {max}, got {0}", max = MAX_WIRE_PLATOON_SIZE)]
    PlatoonTooLarge(usize),

    #[error("Cannot reconfigure while active")]
    Active,
}
