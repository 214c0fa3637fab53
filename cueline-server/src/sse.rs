//! Server-sent status stream (spec.md §4.8).
//!
//! A single background broadcaster coalesces bus events into a debounced
//! JSON status frame and fans it out to every connected client over a
//! `tokio::sync::broadcast` channel; each client stream additionally emits
//! its own `connected` frame and periodic heartbeat comments so a dropped
//! TCP write silently ends that one client without touching the others.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::Event;
use cueline_core::Phase;
use futures::Stream;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::AppState;

/// Debounce window, startup grace, and heartbeat cadence for the broadcaster.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    pub debounce_ms: u64,
    pub startup_grace_ms: u64,
    pub heartbeat_secs: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            startup_grace_ms: 1_000,
            heartbeat_secs: 30,
        }
    }
}

/// Runs until the bus closes. Spawned once by the composition root.
pub async fn run_broadcaster(state: Arc<AppState>, out: broadcast::Sender<String>) {
    tokio::time::sleep(Duration::from_millis(state.broadcast_config.startup_grace_ms)).await;

    let mut rx = state.bus.subscribe();
    let mut pending_since: Option<Instant> = None;
    let mut last_periodic = Instant::now();
    let mut poll = tokio::time::interval(Duration::from_millis(50));

    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Ok(_) => {
                        pending_since.get_or_insert_with(Instant::now);
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        pending_since.get_or_insert_with(Instant::now);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = poll.tick() => {
                let now = Instant::now();
                if let Some(since) = pending_since {
                    if now.duration_since(since) >= Duration::from_millis(state.broadcast_config.debounce_ms) {
                        publish(&state, &out).await;
                        pending_since = None;
                    }
                }

                let playing = state.orchestrator.snapshot().await.phase == Phase::Playing;
                if playing && now.duration_since(last_periodic) >= Duration::from_secs(1) {
                    publish(&state, &out).await;
                    last_periodic = now;
                }
            }
        }
    }
}

async fn publish(state: &AppState, out: &broadcast::Sender<String>) {
    let doc = crate::status::build_status(state).await;
    if let Ok(json) = serde_json::to_string(&doc) {
        // No subscribers is not an error: clients may all be disconnected.
        let _ = out.send(json);
    }
}

/// Per-client frame stream: an immediate `connected` frame, then forwarded
/// broadcast payloads, interleaved with heartbeat comments so idle
/// connections aren't reaped by intermediate proxies.
pub fn sse_stream(state: Arc<AppState>) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        yield Ok(Event::default()
            .event("connected")
            .data(r#"{"status":"connected"}"#));

        let mut rx = state.broadcast_tx.subscribe();
        let heartbeat_secs = state.broadcast_config.heartbeat_secs;
        let mut heartbeat = tokio::time::interval(Duration::from_secs(heartbeat_secs));
        heartbeat.tick().await;

        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Ok(json) => yield Ok(Event::default().data(json)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = heartbeat.tick() => {
                    yield Ok(Event::default().comment("heartbeat"));
                }
            }
        }
    }
}
