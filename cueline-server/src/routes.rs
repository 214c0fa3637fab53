//! HTTP surface (spec.md §6). Every handler enqueues or signals and returns;
//! it never blocks on playback, the result always surfaces through the SSE
//! stream the way spec.md describes the synchronous/asynchronous split.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use cueline_core::{Priority, QueueItem};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::sse::sse_stream;
use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/queue/add", post(add_track))
        .route("/api/queue/skip", post(skip))
        .route("/api/queue/pause", post(pause))
        .route("/api/queue/resume", post(resume))
        .route("/api/queue/remove/:index", post(remove))
        .route("/api/queue/reorder", post(reorder))
        .route("/api/queue/prefetch", post(prefetch))
        .route("/api/queue/newsession", post(newsession))
        .route("/api/queue/seek", post(seek))
        .route("/api/status/stream", get(status_stream))
        .route("/api/effects", put(effects))
        .route("/api/volume", put(volume))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddRequest {
    url: String,
    requester: String,
    #[serde(default)]
    origin_channel: Option<String>,
    #[serde(default)]
    vip: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddResponse {
    descriptor_id: String,
    title: String,
    artist: String,
}

async fn add_track(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddRequest>,
) -> Result<Json<AddResponse>, ApiError> {
    let descriptor = state.resolver.resolve(&req.url).await?;
    let priority = if req.vip { Priority::Vip } else { Priority::Normal };
    let origin_channel = req.origin_channel.unwrap_or_default();
    let item = QueueItem::new(descriptor.clone(), req.requester, origin_channel, priority, 0);
    state.repository.upsert_song(&descriptor).await?;
    state.queue.add(item).await?;
    Ok(Json(AddResponse {
        descriptor_id: descriptor.id,
        title: descriptor.title,
        artist: descriptor.artist,
    }))
}

async fn skip(State(state): State<Arc<AppState>>) -> Result<(), ApiError> {
    state.orchestrator.skip().await?;
    Ok(())
}

async fn pause(State(state): State<Arc<AppState>>) -> Result<(), ApiError> {
    state.orchestrator.pause().await?;
    Ok(())
}

async fn resume(State(state): State<Arc<AppState>>) -> Result<(), ApiError> {
    state.orchestrator.resume().await?;
    Ok(())
}

async fn remove(State(state): State<Arc<AppState>>, Path(index): Path<usize>) -> Result<(), ApiError> {
    state.queue.remove(index).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReorderRequest {
    from_index: usize,
    to_index: usize,
}

async fn reorder(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReorderRequest>,
) -> Result<(), ApiError> {
    state.queue.reorder(req.from_index, req.to_index).await?;
    Ok(())
}

async fn prefetch(State(state): State<Arc<AppState>>) -> Result<(), ApiError> {
    state.orchestrator.prefetch_now().await;
    Ok(())
}

async fn newsession(State(state): State<Arc<AppState>>) -> Result<(), ApiError> {
    state.orchestrator.session_reset().await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeekRequest {
    time: u64,
}

async fn seek(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SeekRequest>,
) -> Result<(), ApiError> {
    state.orchestrator.seek(req.time).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EffectsRequest {
    filter_chain: String,
}

async fn effects(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EffectsRequest>,
) -> Result<(), ApiError> {
    state.orchestrator.effects_changed(&req.filter_chain).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeRequest {
    volume: u8,
}

async fn volume(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VolumeRequest>,
) -> Result<(), ApiError> {
    state.orchestrator.set_volume(req.volume).await?;
    Ok(())
}

async fn status_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, std::convert::Infallible>>> {
    Sse::new(sse_stream(state))
}
