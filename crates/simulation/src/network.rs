//! Simulated broadcast radio.

use crate::NodeIndex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use std::time::Duration;

/// Configuration for the simulated channel.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Base one-way delivery latency.
    pub latency: Duration,

    /// Extra random latency, as a fraction of `latency` (0.0 - 1.0).
    pub jitter_fraction: f64,

    /// Probability that a single delivery is lost (0.0 - 1.0).
    pub loss_rate: f64,

    /// Largest downtrack distance between sender and receiver (m).
    pub radio_range: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(10),
            jitter_fraction: 0.2,
            loss_rate: 0.0,
            radio_range: 300.0,
        }
    }
}

impl NetworkConfig {
    /// Lossless channel with fixed latency.
    pub fn ideal() -> Self {
        Self {
            jitter_fraction: 0.0,
            ..Self::default()
        }
    }

    pub fn with_loss_rate(mut self, loss_rate: f64) -> Self {
        self.loss_rate = loss_rate;
        self
    }

    pub fn with_latency(mut self, latency: Duration, jitter_fraction: f64) -> Self {
        self.latency = latency;
        self.jitter_fraction = jitter_fraction;
        self
    }
}

/// Deterministic lossy broadcast channel.
///
/// All randomness comes from one seeded RNG, drawn in a fixed order, so the
/// same seed and the same sequence of broadcasts yield the same deliveries.
pub struct SimulatedNetwork {
    config: NetworkConfig,
    rng: ChaCha8Rng,
    /// Vehicles whose radio is down in both directions.
    isolated: BTreeSet<NodeIndex>,
}

impl SimulatedNetwork {
    pub fn new(config: NetworkConfig, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            isolated: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Cut a vehicle off the channel.
    pub fn isolate(&mut self, node: NodeIndex) {
        self.isolated.insert(node);
    }

    /// Put an isolated vehicle back on the channel.
    pub fn reconnect(&mut self, node: NodeIndex) {
        self.isolated.remove(&node);
    }

    pub fn is_isolated(&self, node: NodeIndex) -> bool {
        self.isolated.contains(&node)
    }

    /// Receivers of a broadcast from `from` and their delivery delays.
    ///
    /// `positions[i]` is the downtrack distance of vehicle `i`. Receivers are
    /// returned in index order; lost deliveries are counted in the second
    /// element.
    pub fn deliveries(
        &mut self,
        from: NodeIndex,
        positions: &[f64],
    ) -> (Vec<(NodeIndex, Duration)>, u64) {
        if self.is_isolated(from) {
            return (vec![], 0);
        }
        let Some(&origin) = positions.get(from as usize) else {
            return (vec![], 0);
        };

        let mut delivered = Vec::new();
        let mut lost = 0;
        for (index, position) in positions.iter().enumerate() {
            let to = index as NodeIndex;
            if to == from || self.is_isolated(to) {
                continue;
            }
            if (position - origin).abs() > self.config.radio_range {
                continue;
            }
            if self.should_drop() {
                lost += 1;
                continue;
            }
            delivered.push((to, self.sample_latency()));
        }
        (delivered, lost)
    }

    fn should_drop(&mut self) -> bool {
        self.config.loss_rate > 0.0 && self.rng.gen::<f64>() < self.config.loss_rate
    }

    fn sample_latency(&mut self) -> Duration {
        let base = self.config.latency;
        if self.config.jitter_fraction <= 0.0 {
            return base;
        }
        let jitter = self.rng.gen_range(0.0..self.config.jitter_fraction);
        base + base.mul_f64(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_and_isolation() {
        let mut network = SimulatedNetwork::new(NetworkConfig::ideal(), 1);
        let positions = [0.0, 100.0, 500.0];

        let (delivered, lost) = network.deliveries(0, &positions);
        assert_eq!(delivered, vec![(1, Duration::from_millis(10))]);
        assert_eq!(lost, 0);

        network.isolate(1);
        assert!(network.deliveries(0, &positions).0.is_empty());
        assert!(network.deliveries(1, &positions).0.is_empty());

        network.reconnect(1);
        assert_eq!(network.deliveries(1, &positions).0.len(), 1);
    }

    #[test]
    fn test_same_seed_same_deliveries() {
        let config = NetworkConfig::default().with_loss_rate(0.3);
        let positions = [0.0, 10.0, 20.0, 30.0, 40.0];

        let mut a = SimulatedNetwork::new(config.clone(), 42);
        let mut b = SimulatedNetwork::new(config, 42);
        for from in 0..5 {
            assert_eq!(a.deliveries(from, &positions), b.deliveries(from, &positions));
        }
    }

    #[test]
    fn test_total_loss() {
        let mut network =
            SimulatedNetwork::new(NetworkConfig::default().with_loss_rate(1.0), 7);
        let (delivered, lost) = network.deliveries(0, &[0.0, 1.0, 2.0]);
        assert!(delivered.is_empty());
        assert_eq!(lost, 2);
    }
}
