//! Ordering key for the simulation event queue.

use crate::NodeIndex;
use platoon_core::{Event, EventPriority};
use std::time::Duration;

/// Key of a scheduled event.
///
/// Events are processed in key order: by time, then priority, then target
/// vehicle, then insertion sequence. The sequence number makes every key
/// unique, so the queue never drops an event and ties are resolved the same
/// way on every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub time: Duration,
    pub priority: EventPriority,
    pub node: NodeIndex,
    pub sequence: u64,
}

impl EventKey {
    pub fn new(time: Duration, event: &Event, node: NodeIndex, sequence: u64) -> Self {
        Self {
            time,
            priority: event.priority(),
            node,
            sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platoon_core::NegotiationEpoch;
    use platoon_types::EcefPoint;
    use std::collections::BTreeMap;

    #[test]
    fn test_queue_order() {
        let t = Duration::from_millis(100);
        let host = Event::HostStateUpdated {
            location: EcefPoint::default(),
            speed: 0.0,
            command_speed: 0.0,
        };
        let timeout = Event::NegotiationTimeout {
            epoch: NegotiationEpoch(1),
        };

        let mut queue = BTreeMap::new();
        queue.insert(EventKey::new(t, &Event::SpinTimer, 1, 0), "spin-1");
        queue.insert(EventKey::new(t, &timeout, 0, 1), "timeout-0");
        queue.insert(EventKey::new(t, &host, 2, 2), "host-2");
        queue.insert(EventKey::new(Duration::ZERO, &Event::SpinTimer, 3, 3), "early");

        let order: Vec<_> = queue.into_values().collect();
        assert_eq!(order, vec!["early", "host-2", "timeout-0", "spin-1"]);
    }
}
