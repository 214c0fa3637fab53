//! In-process topic pub/sub coupling the orchestrator, adapters, and the
//! SSE broadcaster. Not a global: the composition root owns one `EventBus`
//! and hands every component a clone of its sender / a fresh receiver.

use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Closed set of topics. Stringly-typed channel names are deliberately not
/// an option here: every publisher and subscriber is checked at compile time.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", tag = "topic", content = "data")]
pub enum Topic {
    QueueItemAdded { descriptor_id: String },
    QueueItemRemoved { descriptor_id: String },
    QueueReordered,
    QueueCleared,
    QueueUpdated,
    PlaybackRequested { descriptor_id: String },
    PlaybackStarted { file_path: String },
    PlaybackFinished { file_path: String, reason: FinishReason },
    PlaybackPaused,
    PlaybackResumed,
    PlaybackSeek { position_ms: u64 },
    PlaybackSkip,
    PlaybackPause,
    PlaybackResume,
    PlaybackError { file_path: Option<String>, cause: String },
    EffectsChanged { filter_chain: String },
    ConnectionChanged { connected: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FinishReason {
    Ended,
    Skipped,
    Seek,
    Effects,
    Paused,
    Stopped,
    Error,
}

/// An event enriched with a delivery timestamp, mirroring the envelope shape
/// used for playlist change fan-out.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub topic: Topic,
    pub emitted_at: std::time::SystemTime,
}

/// A single bounded broadcast channel shared by every component.
///
/// Publication is synchronous w.r.t. subscriber enumeration (a `send` simply
/// pushes into the ring buffer) but subscribers must not block in their own
/// receive loop; a slow subscriber only loses old frames (`Lagged`), it never
/// stalls the publisher.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Envelope>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, topic: Topic) {
        let envelope = Envelope {
            topic,
            emitted_at: std::time::SystemTime::now(),
        };
        // No subscribers is not an error: delivery is best-effort, no replay.
        let _ = self.tx.send(envelope);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_topics() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(Topic::QueueUpdated);
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.topic, Topic::QueueUpdated);
    }

    #[tokio::test]
    async fn a_lagging_subscriber_does_not_block_the_publisher() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        for _ in 0..CHANNEL_CAPACITY + 10 {
            bus.publish(Topic::QueueUpdated);
        }
        // The slow subscriber sees Lagged, not a hang.
        let mut saw_lagged = false;
        loop {
            match rx.recv().await {
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    saw_lagged = true;
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        assert!(saw_lagged);
    }
}
