pub mod types;

use tokio::sync::broadcast;

pub use types::Event;

/// Fan-out of turn progress to any number of observers. Publishing never blocks.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: Event) {
        if self.sender.send(event).is_err() {
            tracing::trace!("event dropped; no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(Event::TurnStarted {
            conversation_id: "c1".to_owned(),
            actor_id: "alice".to_owned(),
            command_id: "chat".to_owned(),
        });

        let event = rx.recv().await.expect("event delivered");
        assert_eq!(event.conversation_id(), "c1");
        let json = serde_json::to_value(&event).expect("serializable");
        assert_eq!(json["type"], "turn_started");
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        EventBus::new(0).publish(Event::TurnFinished {
            conversation_id: "c1".to_owned(),
            success: true,
            failure: None,
            elapsed_ms: 5,
        });
    }
}
