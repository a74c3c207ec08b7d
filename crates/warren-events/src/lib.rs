//! In-memory pub/sub for applied-command events.
//!
//! Delivery is best-effort and strictly after command apply: the store
//! publishes once the state machine has mutated, so a subscriber never
//! observes an event for state it cannot read. Slow subscribers drop
//! events (`Lagged`) rather than applying backpressure — the bus is
//! monitoring-only, never correctness-bearing.

use tokio::sync::broadcast;
use warren_kernel::Event;

/// Fan-out broadcaster for cluster events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Creates a bus buffering `buffer_size` events per subscriber.
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _rx) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Publishes an event to all subscribers, returning how many
    /// received it. Zero subscribers is not an error.
    pub fn publish(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or_default()
    }

    /// Subscribes to future events. Events published before the call
    /// are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_types::ServiceId;

    fn event() -> Event {
        Event::ServiceCreated {
            id: ServiceId::generate(),
            name: "web".to_string(),
        }
    }

    #[test]
    fn publish_reaches_all_subscribers() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        assert_eq!(bus.publish(event()), 2);
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish(event()), 0);
    }

    #[test]
    fn slow_subscriber_drops_events() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.publish(event());
        }
        match rx.try_recv() {
            Err(broadcast::error::TryRecvError::Lagged(n)) => assert!(n > 0),
            other => panic!("expected lag, got {other:?}"),
        }
    }
}
