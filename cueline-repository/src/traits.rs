//! Narrow persistence collaborator. Consumed by the queue manager and the
//! orchestrator, never implemented by them.

use crate::Result;
use async_trait::async_trait;
use cueline_core::{PlaybackSnapshot, QueueItem, TrackDescriptor};

#[async_trait]
pub trait Repository: Send + Sync {
    /// Inserts or updates song metadata, returning its stable song id.
    async fn upsert_song(&self, descriptor: &TrackDescriptor) -> Result<String>;

    async fn get_song(&self, id: &str) -> Result<Option<TrackDescriptor>>;

    /// Loads the queue in persisted position order.
    async fn load_queue(&self) -> Result<Vec<QueueItem>>;

    /// Atomically replaces the persisted queue. Concurrent readers never
    /// observe a partial reorder.
    async fn persist_queue(&self, items: &[QueueItem]) -> Result<()>;

    async fn load_playback_snapshot(&self) -> Result<Option<PlaybackSnapshot>>;

    async fn persist_playback_snapshot(&self, snapshot: &PlaybackSnapshot) -> Result<()>;
}
