//! Event sink for engine observers
//!
//! Provides:
//! - Event types for queueing, transmission, acknowledgements, state and errors
//! - Event dispatcher for publishing events to any number of subscribers
//!
//! Subscribing never influences engine behavior. A slow subscriber lags and
//! loses the oldest events; the engine never waits for it.

use crate::data::{ErrorEvent, JobId, MachineState, Position};
use tokio::sync::broadcast;

/// Engine event types
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Link opened and processing loop started
    Connected(String),
    /// Processing loop stopped and link released
    Disconnected,
    /// A normalized line entered the command queue
    Queued(String),
    /// A line was written to the link
    Sent(String),
    /// The firmware acknowledged the oldest in-flight line
    Ack(String),
    /// Raw status summary changed
    StatusChanged(String),
    /// Machine position parsed from a status report
    PositionUpdated(Position),
    /// Firmware raised an error or alarm
    ErrorRaised(ErrorEvent),
    /// Machine state transition
    StateChanged(MachineState),
    /// Job progress recomputed
    ProgressChanged(f64),
    /// Bracketed informational message from the firmware
    Message(String),
    /// A job finished streaming
    JobCompleted(JobId),
}

impl std::fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineEvent::Connected(port) => write!(f, "Connected to {}", port),
            EngineEvent::Disconnected => write!(f, "Disconnected"),
            EngineEvent::Queued(line) => write!(f, "Queued {}", line),
            EngineEvent::Sent(line) => write!(f, "Sent {}", line),
            EngineEvent::Ack(line) => write!(f, "Ok {}", line),
            EngineEvent::StatusChanged(text) => write!(f, "Status: {}", text),
            EngineEvent::PositionUpdated(pos) => write!(f, "Position: {}", pos),
            EngineEvent::ErrorRaised(event) => write!(f, "{}", event),
            EngineEvent::StateChanged(state) => write!(f, "State: {}", state),
            EngineEvent::ProgressChanged(progress) => {
                write!(f, "Progress: {:.1}%", progress * 100.0)
            }
            EngineEvent::Message(text) => write!(f, "Message: {}", text),
            EngineEvent::JobCompleted(job) => write!(f, "{} completed", job),
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender channel for engine events.
    tx: broadcast::Sender<EngineEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 1024)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Having no subscribers is not an error: the event is simply dropped.
    pub fn publish(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No event subscribers");
        }
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let dispatcher = EventDispatcher::default();
        let mut first = dispatcher.subscribe();
        let mut second = dispatcher.subscribe();
        assert_eq!(dispatcher.subscriber_count(), 2);

        dispatcher.publish(EngineEvent::Queued("G0X1".to_string()));

        assert_eq!(
            first.recv().await.unwrap(),
            EngineEvent::Queued("G0X1".to_string())
        );
        assert_eq!(
            second.recv().await.unwrap(),
            EngineEvent::Queued("G0X1".to_string())
        );
    }

    #[test]
    fn test_publish_without_subscribers() {
        let dispatcher = EventDispatcher::new(4);
        dispatcher.publish(EngineEvent::Disconnected);
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[test]
    fn test_event_display() {
        assert_eq!(
            EngineEvent::ProgressChanged(0.5).to_string(),
            "Progress: 50.0%"
        );
        assert_eq!(
            EngineEvent::StateChanged(MachineState::Paused).to_string(),
            "State: Paused"
        );
    }
}
