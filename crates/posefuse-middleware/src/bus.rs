//! Typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others, and a slow subscriber never stalls the fusion loop.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::FusedPose`] | Corrected robot pose at odometry rate |
//! | [`Topic::Diagnostics`] | Per-step filter feedback (weights, quality, expectations) |
//! | [`Topic::SystemAlerts`] | Convergence gained or lost |

use posefuse_types::{Event, FusionError};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Fused pose stream.
    FusedPose,
    /// Filter step diagnostics.
    Diagnostics,
    /// Convergence transitions.
    SystemAlerts,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    fused_pose: broadcast::Sender<Event>,
    diagnostics: broadcast::Sender<Event>,
    system_alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus.  `capacity` is applied to every topic channel
    /// independently.
    pub fn new(capacity: usize) -> Self {
        let (fused_pose, _) = broadcast::channel(capacity);
        let (diagnostics, _) = broadcast::channel(capacity);
        let (system_alerts, _) = broadcast::channel(capacity);
        Self {
            fused_pose,
            diagnostics,
            system_alerts,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    ///
    /// # Errors
    ///
    /// [`FusionError::Channel`] when nobody is subscribed to `topic`.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, FusionError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| FusionError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::FusedPose => &self.fused_pose,
            Topic::Diagnostics => &self.diagnostics,
            Topic::SystemAlerts => &self.system_alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Like [`recv`][Self::recv], but skips over lag.
    ///
    /// Returns `None` once the bus is closed.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posefuse_types::{EventPayload, FusionQuality, Pose, Stamped};

    fn pose_event(time_ms: i64) -> Event {
        Event::new(
            "posefuse-middleware::test",
            EventPayload::FusedPose(Stamped::new(time_ms, Pose::new(1.0, 2.0, 0.0))),
        )
    }

    #[test]
    fn publish_without_subscribers_is_an_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(Topic::FusedPose, pose_event(0));
        assert!(matches!(result, Err(FusionError::Channel(_))));
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut subscriber1 = bus.subscribe_to(Topic::FusedPose);
        let mut subscriber2 = bus.subscribe_to(Topic::FusedPose);
        assert_eq!(bus.subscriber_count(Topic::FusedPose), 2);

        let event = pose_event(10);
        assert_eq!(bus.publish_to(Topic::FusedPose, event.clone())?, 2);

        assert_eq!(subscriber1.recv().await?.id, event.id);
        assert_eq!(subscriber2.recv().await?.id, event.id);
        Ok(())
    }

    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
        let _poses = bus.subscribe_to(Topic::FusedPose);

        bus.publish_to(Topic::FusedPose, pose_event(20))?;

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), alerts.recv()).await;
        assert!(result.is_err(), "SystemAlerts subscriber must not receive a pose");
        assert_eq!(alerts.topic(), Topic::SystemAlerts);
        Ok(())
    }

    #[tokio::test]
    async fn alerts_carry_convergence_changes() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
        bus.publish_to(
            Topic::SystemAlerts,
            Event::new(
                "posefuse-middleware::test",
                EventPayload::ConvergenceChanged {
                    convergent: true,
                    quality: Stamped::new(5, FusionQuality::zero()),
                },
            ),
        )?;
        match alerts.recv().await?.payload {
            EventPayload::ConvergenceChanged { convergent, quality } => {
                assert!(convergent);
                assert_eq!(quality.time_ms, 5);
            }
            other => panic!("unexpected payload {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn topic_channel_lag_on_slow_subscriber() {
        const CAPACITY: usize = 16;
        let bus = EventBus::new(CAPACITY);
        let mut slow = bus.subscribe_to(Topic::Diagnostics);

        for t in 0..1_000 {
            let _ = bus.publish_to(Topic::Diagnostics, pose_event(t));
        }

        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }

    #[tokio::test]
    async fn next_skips_lag_and_ends_on_close() {
        let bus = EventBus::new(4);
        let mut slow = bus.subscribe_to(Topic::FusedPose);
        for t in 0..20 {
            let _ = bus.publish_to(Topic::FusedPose, pose_event(t));
        }

        // After the lag notice the oldest retained event is delivered.
        let first = slow.next().await.expect("event after lag");
        match first.payload {
            EventPayload::FusedPose(p) => assert_eq!(p.time_ms, 16),
            other => panic!("unexpected payload {other:?}"),
        }

        drop(bus);
        let mut remaining = 0;
        while slow.next().await.is_some() {
            remaining += 1;
        }
        assert_eq!(remaining, 3);
    }
}
