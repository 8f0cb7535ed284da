//! Typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels so that every subscriber receives
//! every message without any single subscriber blocking the others. A slow
//! subscriber loses the oldest events (it sees `Lagged`), never the
//! publisher's time.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Telemetry`] | Controller telemetry frames and `!` status lines |
//! | [`Topic::StateChanges`] | Orchestrator state transitions |
//! | [`Topic::Faults`] | Errors that sent the machine to recovery |
//! | [`Topic::Decisions`] | Parsed decisions and the actions taken |

use rover_types::{Event, EventPayload};
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Telemetry,
    StateChanges,
    Faults,
    Decisions,
}

impl Topic {
    /// The lane an event payload belongs on.
    pub fn for_payload(payload: &EventPayload) -> Self {
        match payload {
            EventPayload::Telemetry(_) | EventPayload::DeviceStatus(_) => Self::Telemetry,
            EventPayload::StateChanged { .. } => Self::StateChanges,
            EventPayload::Fault { .. } => Self::Faults,
            EventPayload::Decision { .. } => Self::Decisions,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    telemetry: broadcast::Sender<Event>,
    state_changes: broadcast::Sender<Event>,
    faults: broadcast::Sender<Event>,
    decisions: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` applies to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (telemetry, _) = broadcast::channel(capacity);
        let (state_changes, _) = broadcast::channel(capacity);
        let (faults, _) = broadcast::channel(capacity);
        let (decisions, _) = broadcast::channel(capacity);
        Self {
            telemetry,
            state_changes,
            faults,
            decisions,
        }
    }

    /// Publish `event` on `topic`.
    ///
    /// Returns the number of receivers handed the event. Nobody listening is
    /// a normal condition and yields `0`.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        match self.topic_sender(topic).send(event) {
            Ok(n) => n,
            Err(_) => {
                trace!(?topic, "no subscribers, event dropped");
                0
            }
        }
    }

    /// Wrap `payload` in an [`Event`] and publish it on its natural topic.
    pub fn emit(&self, source: &str, payload: EventPayload) -> usize {
        let topic = Topic::for_payload(&payload);
        self.publish_to(topic, Event::new(source, payload))
    }

    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Telemetry => &self.telemetry,
            Topic::StateChanges => &self.state_changes,
            Topic::Faults => &self.faults,
            Topic::Decisions => &self.decisions,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Topic`] channel.
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// `Lagged(n)` means this receiver fell behind and `n` events were
    /// dropped; `Closed` means every sender is gone.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant, for draining inside a synchronous step.
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_types::RobotState;

    fn state_event() -> EventPayload {
        EventPayload::StateChanged {
            from: RobotState::Idle,
            to: RobotState::Surveying,
        }
    }

    #[tokio::test]
    async fn emit_routes_by_payload() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut states = bus.subscribe_to(Topic::StateChanges);
        let mut faults = bus.subscribe_to(Topic::Faults);

        assert_eq!(bus.emit("test", state_event()), 1);
        let ev = states.recv().await?;
        assert!(matches!(ev.payload, EventPayload::StateChanged { .. }));
        assert_eq!(ev.source, "test");
        assert!(faults.try_recv().is_err());
        Ok(())
    }

    #[test]
    fn publishing_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.emit("test", state_event()), 0);
    }

    #[tokio::test]
    async fn every_subscriber_sees_the_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut a = bus.subscribe_to(Topic::Decisions);
        let mut b = bus.subscribe_to(Topic::Decisions);
        let event = Event::new(
            "test",
            EventPayload::Decision {
                summary: "turn_left 800ms".into(),
            },
        );
        assert_eq!(bus.publish_to(Topic::Decisions, event.clone()), 2);
        assert_eq!(a.recv().await?.id, event.id);
        assert_eq!(b.recv().await?.id, event.id);
        Ok(())
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(8);
        let mut slow = bus.subscribe_to(Topic::Telemetry);
        for _ in 0..100 {
            bus.emit("flood", EventPayload::DeviceStatus("tick".into()));
        }
        let result = slow.recv().await;
        assert!(matches!(
            result,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert_eq!(slow.topic(), Topic::Telemetry);
    }
}
