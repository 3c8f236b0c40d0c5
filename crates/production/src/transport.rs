//! Transport seam between the runner and the V2X channel.
//!
//! Wire encoding belongs to the transport. The runner only ever hands over
//! and receives [`RawMessage`] records.

use platoon_messages::RawMessage;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::trace;

/// Errors from publishing a message.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport closed")]
    Closed,

    #[error("Failed to publish on {channel}: {reason}")]
    Publish { channel: String, reason: String },
}

/// Outbound side of the V2X channel.
pub trait Transport: Send + Sync + 'static {
    /// Publish a record on the channel matching its kind.
    fn publish(&self, message: RawMessage) -> Result<(), TransportError>;
}

/// In-process broadcast bus.
///
/// Every subscriber sees every published record, its own included, the way
/// a shared radio channel behaves. Slow subscribers lose the oldest records
/// once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<RawMessage>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Receive every record published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RawMessage> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Transport for LocalBus {
    fn publish(&self, message: RawMessage) -> Result<(), TransportError> {
        trace!(
            channel = %message.channel(),
            sender = %message.header().sender_id,
            "Publishing on local bus"
        );
        // No subscribers is not an error on a broadcast medium.
        let _ = self.tx.send(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platoon_test_helpers::raw_status;

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = LocalBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let message = raw_status("veh-1", None, 20.0, 100.0, 20.0);
        bus.publish(message.clone()).unwrap();

        assert_eq!(a.recv().await.unwrap(), message);
        assert_eq!(b.recv().await.unwrap(), message);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = LocalBus::default();
        assert!(bus
            .publish(raw_status("veh-1", None, 20.0, 100.0, 20.0))
            .is_ok());
    }
}
