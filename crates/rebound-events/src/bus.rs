use crate::events::HostEvent;
use tokio::sync::broadcast;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

pub trait EventBus: Send + Sync {
    fn publish(&self, event: HostEvent);
    fn subscribe(&self) -> broadcast::Receiver<HostEvent>;
    fn subscriber_count(&self) -> usize;
}

#[derive(Clone)]
pub struct BroadcastBus {
    sender: broadcast::Sender<HostEvent>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a raw host event, dropping event types this crate does not model.
    pub fn publish_json(&self, value: &serde_json::Value) -> bool {
        match HostEvent::from_json(value) {
            Some(event) => {
                self.publish(event);
                true
            }
            None => false,
        }
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for BroadcastBus {
    fn publish(&self, event: HostEvent) {
        if let Err(e) = self.sender.send(event) {
            tracing::warn!(
                "Failed to publish event (no subscribers?): {:?}",
                e.0.event_name()
            );
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.sender.subscribe()
    }

    /// Live receivers; dropped receivers are no longer counted.
    fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
