//! Ordering of scheduled simulation events.

use std::time::Duration;
use tally_core::Event;
use tally_types::ServerIndex;

/// Priority of events scheduled for the same instant. Lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    /// Generated by the runner on a node's behalf (e.g. send failures).
    Internal = 0,
    /// Timer expiry.
    Timer = 1,
    /// Message delivery.
    Network = 2,
}

impl EventPriority {
    /// Priority for an event about to be scheduled.
    pub fn for_event(event: &Event) -> Self {
        match event {
            Event::RoundTimeout => EventPriority::Timer,
            event if event.is_internal() => EventPriority::Internal,
            _ => EventPriority::Network,
        }
    }
}

/// Key for the simulation event queue.
///
/// Field order defines the total order: time, then priority, then target
/// node, then insertion sequence. The sequence number makes every key unique
/// and keeps same-instant events in scheduling order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub time: Duration,
    pub priority: EventPriority,
    pub node: ServerIndex,
    pub sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn key(millis: u64, priority: EventPriority, node: u32, sequence: u64) -> EventKey {
        EventKey {
            time: Duration::from_millis(millis),
            priority,
            node: ServerIndex(node),
            sequence,
        }
    }

    #[test]
    fn test_ordering() {
        let mut queue = BTreeMap::new();
        queue.insert(key(10, EventPriority::Network, 0, 0), "late");
        queue.insert(key(5, EventPriority::Network, 1, 1), "network");
        queue.insert(key(5, EventPriority::Timer, 2, 2), "timer");
        queue.insert(key(5, EventPriority::Network, 1, 3), "network-second");
        queue.insert(key(5, EventPriority::Internal, 3, 4), "internal");

        let order: Vec<_> = queue.into_values().collect();
        assert_eq!(
            order,
            vec!["internal", "timer", "network", "network-second", "late"]
        );
    }

    #[test]
    fn test_priority_for_event() {
        assert_eq!(
            EventPriority::for_event(&Event::RoundTimeout),
            EventPriority::Timer
        );
        assert_eq!(
            EventPriority::for_event(&Event::TransportFailed {
                to: ServerIndex(1),
                reason: String::new(),
            }),
            EventPriority::Internal
        );
    }
}
