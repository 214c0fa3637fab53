//! The JSON "status" document broadcast to every SSE subscriber (spec.md §4.8).

use cueline_core::{Phase, QueueItem};
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentTrackView {
    pub descriptor_id: String,
    pub title: String,
    pub artist: String,
    pub thumbnail_uri: Option<String>,
    pub duration_ms: Option<u64>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItemView {
    pub descriptor_id: String,
    pub title: String,
    pub artist: String,
    pub thumbnail_uri: Option<String>,
    pub requester: String,
    pub priority: cueline_core::Priority,
}

impl From<&QueueItem> for QueueItemView {
    fn from(item: &QueueItem) -> Self {
        Self {
            descriptor_id: item.descriptor.id.clone(),
            title: item.descriptor.title.clone(),
            artist: item.descriptor.artist.clone(),
            thumbnail_uri: item.descriptor.thumbnail_uri.clone(),
            requester: item.requester.clone(),
            priority: item.priority,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub uptime_secs: u64,
    pub songs_played: u64,
    pub queue_length: usize,
}

/// `shuffle`/`repeat` and the countdown sub-state are owned by an external
/// collaborator the core never models; they are carried opaquely so the
/// wire shape matches spec.md §4.8 without inventing behavior for them.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDocument {
    pub connected: bool,
    pub phase: Phase,
    pub current: Option<CurrentTrackView>,
    pub queue: Vec<QueueItemView>,
    pub stats: Stats,
    pub shuffle: bool,
    pub repeat: bool,
    pub countdown: Option<serde_json::Value>,
}

/// Assembles the current status document from live orchestrator/queue state.
pub async fn build_status(state: &AppState) -> StatusDocument {
    let snapshot = state.orchestrator.snapshot().await;
    let queue = state.queue.snapshot().await;
    let elapsed_ms = state.orchestrator.elapsed_ms().await;

    let current = match &snapshot.current_descriptor_id {
        Some(descriptor_id) => {
            let descriptor = state.repository.get_song(descriptor_id).await.ok().flatten();
            Some(CurrentTrackView {
                descriptor_id: descriptor_id.clone(),
                title: descriptor.as_ref().map(|d| d.title.clone()).unwrap_or_default(),
                artist: descriptor.as_ref().map(|d| d.artist.clone()).unwrap_or_default(),
                thumbnail_uri: descriptor.as_ref().and_then(|d| d.thumbnail_uri.clone()),
                duration_ms: descriptor.as_ref().and_then(|d| d.duration_ms),
                elapsed_ms,
            })
        }
        None => None,
    };

    StatusDocument {
        connected: true,
        phase: snapshot.phase,
        current,
        queue: queue.iter().map(QueueItemView::from).collect(),
        stats: Stats {
            uptime_secs: state.started_at.elapsed().as_secs(),
            songs_played: snapshot.songs_played_counter,
            queue_length: queue.len(),
        },
        shuffle: false,
        repeat: false,
        countdown: None,
    }
}
