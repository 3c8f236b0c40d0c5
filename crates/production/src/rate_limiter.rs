//! Per-sender rate limiting for inbound coordination messages.
//!
//! A token bucket per sender keeps one chatty or misbehaving vehicle from
//! flooding the intake channel. Peers legitimately send a STATUS and an INFO
//! per spin plus the occasional negotiation message, so the defaults leave
//! plenty of headroom.

use platoon_types::VehicleId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Configuration for rate limiting.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Sustained messages per second per sender.
    pub messages_per_sec: u32,
    /// Maximum burst size (bucket capacity).
    pub burst: u32,
    /// How long to track a sender after its last message.
    pub sender_ttl: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages_per_sec: 100,
            burst: 50,
            sender_ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_rate: u32, now: Instant) -> Self {
        Self {
            tokens: capacity as f64,
            capacity: capacity as f64,
            refill_rate: refill_rate as f64,
            last_update: now,
        }
    }

    /// Try to consume one token. Returns true if allowed.
    fn try_consume(&mut self, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.last_update) > ttl
    }
}

/// Per-sender rate limiter using token buckets.
pub struct InboundRateLimiter {
    config: RateLimitConfig,
    buckets: HashMap<VehicleId, TokenBucket>,
    last_cleanup: Instant,
}

impl InboundRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: HashMap::new(),
            last_cleanup: Instant::now(),
        }
    }

    /// Check whether a message from `sender` should be let through.
    pub fn check(&mut self, sender: &VehicleId) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_cleanup) > self.config.sender_ttl {
            self.cleanup(now);
        }

        let (burst, rate) = (self.config.burst, self.config.messages_per_sec);
        self.buckets
            .entry(sender.clone())
            .or_insert_with(|| TokenBucket::new(burst, rate, now))
            .try_consume(now)
    }

    /// Forget senders that have been quiet for longer than the TTL.
    fn cleanup(&mut self, now: Instant) {
        let ttl = self.config.sender_ttl;
        self.buckets.retain(|_, bucket| !bucket.is_stale(now, ttl));
        self.last_cleanup = now;
    }

    pub fn tracked_senders(&self) -> usize {
        self.buckets.len()
    }
}
