//! End-to-end coverage of spec.md §8's scenarios through the real HTTP
//! surface: a bound listener, a `reqwest` client, and fakes standing in for
//! the resolver/player/repository at the exact trait boundary a production
//! collaborator would use.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cueline_core::{EventBus, FinishReason, PlaybackSnapshot, QueueItem, TrackDescriptor};
use cueline_download::{Downloader, RetryPolicy};
use cueline_orchestrator::Orchestrator;
use cueline_player::PlayerAdapter;
use cueline_queue::QueueManager;
use cueline_repository::Repository;
use cueline_resolver::{ProgressSink, Resolver};
use cueline_server::{AppState, BroadcastConfig};
use tokio::sync::Mutex;

struct FakeResolver {
    dir: tempfile::TempDir,
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn resolve(&self, input: &str) -> cueline_resolver::Result<TrackDescriptor> {
        let mut descriptor = TrackDescriptor::new(input, cueline_core::TrackKind::Remote);
        descriptor.title = format!("title for {input}");
        descriptor.artist = "fake artist".to_string();
        Ok(descriptor)
    }

    async fn fetch_artifact(
        &self,
        descriptor: &TrackDescriptor,
        _sink: ProgressSink,
    ) -> cueline_resolver::Result<std::path::PathBuf> {
        let path = self.dir.path().join(format!("{}.bin", descriptor.id));
        tokio::fs::write(&path, b"fake-audio").await.ok();
        Ok(path)
    }
}

struct FakeRepository {
    queue: Mutex<Vec<QueueItem>>,
    snapshot: Mutex<Option<PlaybackSnapshot>>,
}

impl FakeRepository {
    fn new() -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            snapshot: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Repository for FakeRepository {
    async fn upsert_song(&self, descriptor: &TrackDescriptor) -> cueline_repository::Result<String> {
        Ok(descriptor.id.clone())
    }

    async fn get_song(&self, _id: &str) -> cueline_repository::Result<Option<TrackDescriptor>> {
        Ok(None)
    }

    async fn load_queue(&self) -> cueline_repository::Result<Vec<QueueItem>> {
        Ok(self.queue.lock().await.clone())
    }

    async fn persist_queue(&self, items: &[QueueItem]) -> cueline_repository::Result<()> {
        *self.queue.lock().await = items.to_vec();
        Ok(())
    }

    async fn load_playback_snapshot(&self) -> cueline_repository::Result<Option<PlaybackSnapshot>> {
        Ok(self.snapshot.lock().await.clone())
    }

    async fn persist_playback_snapshot(&self, snapshot: &PlaybackSnapshot) -> cueline_repository::Result<()> {
        *self.snapshot.lock().await = Some(snapshot.clone());
        Ok(())
    }
}

/// Finishes every `play()` call almost immediately with `Ended`, so the
/// orchestrator's auto-advance loop makes visible progress inside a test's
/// short timeout without a real audio backend.
struct InstantAdapter {
    plays: AtomicUsize,
}

impl InstantAdapter {
    fn new() -> Self {
        Self { plays: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl PlayerAdapter for InstantAdapter {
    async fn play(&self, _file_path: &Path, _start_offset_ms: u64) -> cueline_player::Result<FinishReason> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(FinishReason::Ended)
    }

    async fn stop(&self) -> cueline_player::Result<()> {
        Ok(())
    }

    async fn pause(&self) -> cueline_player::Result<()> {
        Ok(())
    }

    async fn resume(&self) -> cueline_player::Result<()> {
        Ok(())
    }

    async fn seek(&self, _position_ms: u64) -> cueline_player::Result<()> {
        Ok(())
    }

    async fn get_position(&self) -> cueline_player::Result<u64> {
        Ok(0)
    }

    async fn set_volume(&self, _volume: u8) -> cueline_player::Result<()> {
        Ok(())
    }

    async fn get_volume(&self) -> cueline_player::Result<u8> {
        Ok(100)
    }

    async fn update_filters(&self, _filter_chain: &str) -> cueline_player::Result<()> {
        Ok(())
    }

    fn is_playing(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

async fn spawn_test_server() -> (reqwest::Client, String) {
    let bus = EventBus::new();
    let queue = Arc::new(QueueManager::new(bus.clone()));
    let resolver: Arc<dyn Resolver> = Arc::new(FakeResolver {
        dir: tempfile::tempdir().unwrap(),
    });
    let downloader = Arc::new(Downloader::new(resolver.clone(), 2, RetryPolicy::default(), bus.clone()));
    let repository: Arc<dyn Repository> = Arc::new(FakeRepository::new());
    let adapter: Arc<dyn PlayerAdapter> = Arc::new(InstantAdapter::new());
    let orchestrator = Orchestrator::new(queue.clone(), downloader.clone(), adapter, repository.clone(), bus.clone(), 2);
    orchestrator.spawn();

    let state = Arc::new(AppState::new(
        queue,
        orchestrator,
        resolver,
        downloader,
        repository,
        bus,
        BroadcastConfig {
            debounce_ms: 20,
            startup_grace_ms: 0,
            heartbeat_secs: 30,
        },
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = cueline_server::build(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    (reqwest::Client::new(), format!("http://{addr}"))
}

#[tokio::test]
async fn happy_path_add_then_stream_opens_with_connected_frame() {
    use futures::StreamExt;

    let (client, base) = spawn_test_server().await;

    let resp = client
        .post(format!("{base}/api/queue/add"))
        .json(&serde_json::json!({"url": "https://example.com/a", "requester": "alice"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let stream_resp = client.get(format!("{base}/api/status/stream")).send().await.unwrap();
    assert_eq!(stream_resp.status(), reqwest::StatusCode::OK);

    let mut bytes = stream_resp.bytes_stream();
    let first_chunk = tokio::time::timeout(Duration::from_secs(2), bytes.next())
        .await
        .expect("stream produced a frame before timeout")
        .expect("stream did not close immediately")
        .unwrap();
    let text = String::from_utf8_lossy(&first_chunk);
    assert!(text.contains("connected"));
}

#[tokio::test]
async fn duplicate_add_returns_409() {
    let (client, base) = spawn_test_server().await;
    let body = serde_json::json!({"url": "https://example.com/dup", "requester": "alice"});

    let first = client.post(format!("{base}/api/queue/add")).json(&body).send().await.unwrap();
    assert_eq!(first.status(), reqwest::StatusCode::OK);

    let second = client.post(format!("{base}/api/queue/add")).json(&body).send().await.unwrap();
    assert_eq!(second.status(), reqwest::StatusCode::CONFLICT);
}

#[tokio::test]
async fn reorder_across_priority_classes_returns_400() {
    let (client, base) = spawn_test_server().await;

    client
        .post(format!("{base}/api/queue/add"))
        .json(&serde_json::json!({"url": "https://example.com/vip", "requester": "alice", "vip": true}))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{base}/api/queue/add"))
        .json(&serde_json::json!({"url": "https://example.com/normal", "requester": "bob"}))
        .send()
        .await
        .unwrap();

    let resp = client
        .post(format!("{base}/api/queue/reorder"))
        .json(&serde_json::json!({"fromIndex": 1, "toIndex": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn remove_out_of_range_returns_400() {
    let (client, base) = spawn_test_server().await;

    let resp = client.post(format!("{base}/api/queue/remove/5")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
}
