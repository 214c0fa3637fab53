//! SQLite-backed `Repository`, grounded on the teacher's `PersistenceManager`
//! (single connection behind a mutex, `INSERT OR REPLACE` upserts, explicit
//! table creation on open). Every call is dispatched through
//! `spawn_blocking` so a slow disk never stalls the async runtime.

use crate::error::RepositoryError;
use crate::traits::Repository;
use crate::Result;
use async_trait::async_trait;
use cueline_core::{DownloadState, PlaybackSnapshot, Phase, Priority, QueueItem, TrackDescriptor, TrackKind};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RepositoryError::Open(format!("failed to create directory: {e}")))?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| RepositoryError::Open(format!("failed to open database: {e}")))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS songs (
                id TEXT PRIMARY KEY,
                source_url TEXT NOT NULL,
                title TEXT NOT NULL,
                artist TEXT NOT NULL,
                channel TEXT NOT NULL,
                duration_ms INTEGER,
                thumbnail_path TEXT,
                kind TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS queue_items (
                song_id TEXT NOT NULL,
                requester TEXT NOT NULL,
                requester_key TEXT,
                origin_channel TEXT NOT NULL,
                priority TEXT NOT NULL,
                position INTEGER NOT NULL,
                download_status TEXT NOT NULL,
                download_detail TEXT,
                added_at INTEGER NOT NULL,
                FOREIGN KEY (song_id) REFERENCES songs(id)
            );
            CREATE INDEX IF NOT EXISTS idx_queue_items_position ON queue_items(position);
            CREATE TABLE IF NOT EXISTS playback_state (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                current_song_id TEXT,
                current_file_path TEXT,
                is_playing INTEGER NOT NULL,
                is_paused INTEGER NOT NULL,
                start_time_ms INTEGER,
                paused_at_ms INTEGER,
                seek_position_ms INTEGER NOT NULL,
                songs_played INTEGER NOT NULL
            );",
        )
        .map_err(|e| RepositoryError::Execute(format!("failed to create schema: {e}")))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            f(&conn)
        })
        .await
        .map_err(|e| RepositoryError::Execute(format!("blocking task panicked: {e}")))?
    }
}

fn priority_to_str(p: Priority) -> &'static str {
    match p {
        Priority::Normal => "normal",
        Priority::Vip => "vip",
        Priority::System => "system",
    }
}

fn priority_from_str(s: &str) -> Priority {
    match s {
        "vip" => Priority::Vip,
        "system" => Priority::System,
        _ => Priority::Normal,
    }
}

fn download_state_to_parts(s: &DownloadState) -> (&'static str, Option<String>) {
    match s {
        DownloadState::Pending => ("pending", None),
        DownloadState::Inflight => ("inflight", None),
        DownloadState::Ready(path) => ("ready", Some(path.clone())),
        DownloadState::Failed(reason) => ("failed", Some(reason.clone())),
    }
}

fn download_state_from_parts(status: &str, detail: Option<String>) -> DownloadState {
    match status {
        "inflight" => DownloadState::Inflight,
        "ready" => DownloadState::Ready(detail.unwrap_or_default()),
        "failed" => DownloadState::Failed(detail.unwrap_or_default()),
        _ => DownloadState::Pending,
    }
}

fn kind_to_str(k: TrackKind) -> &'static str {
    match k {
        TrackKind::Remote => "remote",
        TrackKind::LocalFile => "localFile",
    }
}

fn kind_from_str(s: &str) -> TrackKind {
    match s {
        "localFile" => TrackKind::LocalFile,
        _ => TrackKind::Remote,
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn upsert_song(&self, descriptor: &TrackDescriptor) -> Result<String> {
        let descriptor = descriptor.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO songs (id, source_url, title, artist, channel, duration_ms, thumbnail_path, kind)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    source_url = excluded.source_url,
                    title = excluded.title,
                    artist = excluded.artist,
                    channel = excluded.channel,
                    duration_ms = excluded.duration_ms,
                    thumbnail_path = excluded.thumbnail_path,
                    kind = excluded.kind",
                params![
                    descriptor.id,
                    descriptor.source_uri,
                    descriptor.title,
                    descriptor.artist,
                    descriptor.channel,
                    descriptor.duration_ms.map(|d| d as i64),
                    descriptor.thumbnail_uri,
                    kind_to_str(descriptor.kind),
                ],
            )
            .map_err(|e| RepositoryError::Execute(format!("failed to upsert song: {e}")))?;
            Ok(descriptor.id.clone())
        })
        .await
    }

    async fn get_song(&self, id: &str) -> Result<Option<TrackDescriptor>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, source_url, title, artist, channel, duration_ms, thumbnail_path, kind
                     FROM songs WHERE id = ?1",
                )
                .map_err(|e| RepositoryError::Prepare(e.to_string()))?;

            let result = stmt.query_row(params![id], |row| {
                Ok(TrackDescriptor {
                    id: row.get(0)?,
                    source_uri: row.get(1)?,
                    title: row.get(2)?,
                    artist: row.get(3)?,
                    channel: row.get(4)?,
                    duration_ms: row.get::<_, Option<i64>>(5)?.map(|d| d as u64),
                    thumbnail_uri: row.get(6)?,
                    kind: kind_from_str(&row.get::<_, String>(7)?),
                })
            });

            match result {
                Ok(descriptor) => Ok(Some(descriptor)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(RepositoryError::Read(e.to_string())),
            }
        })
        .await
    }

    async fn load_queue(&self) -> Result<Vec<QueueItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT s.id, s.source_url, s.title, s.artist, s.channel, s.duration_ms,
                            s.thumbnail_path, s.kind,
                            q.requester, q.requester_key, q.origin_channel, q.priority,
                            q.download_status, q.download_detail, q.added_at
                     FROM queue_items q JOIN songs s ON s.id = q.song_id
                     ORDER BY q.position ASC",
                )
                .map_err(|e| RepositoryError::Prepare(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    let descriptor = TrackDescriptor {
                        id: row.get(0)?,
                        source_uri: row.get(1)?,
                        title: row.get(2)?,
                        artist: row.get(3)?,
                        channel: row.get(4)?,
                        duration_ms: row.get::<_, Option<i64>>(5)?.map(|d| d as u64),
                        thumbnail_uri: row.get(6)?,
                        kind: kind_from_str(&row.get::<_, String>(7)?),
                    };
                    let status: String = row.get(12)?;
                    let detail: Option<String> = row.get(13)?;
                    Ok(QueueItem {
                        descriptor,
                        requester: row.get(8)?,
                        requester_key: row.get(9)?,
                        origin_channel: row.get(10)?,
                        priority: priority_from_str(&row.get::<_, String>(11)?),
                        download_state: download_state_from_parts(&status, detail),
                        added_at: row.get::<_, i64>(14)? as u64,
                    })
                })
                .map_err(|e| RepositoryError::Read(e.to_string()))?;

            let mut items = Vec::new();
            for row in rows {
                items.push(row.map_err(|e| RepositoryError::Read(e.to_string()))?);
            }
            Ok(items)
        })
        .await
    }

    async fn persist_queue(&self, items: &[QueueItem]) -> Result<()> {
        let items = items.to_vec();
        self.with_conn(move |conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| RepositoryError::Execute(e.to_string()))?;

            tx.execute("DELETE FROM queue_items", [])
                .map_err(|e| RepositoryError::Execute(format!("failed to clear queue: {e}")))?;

            for (position, item) in items.iter().enumerate() {
                tx.execute(
                    "INSERT INTO songs (id, source_url, title, artist, channel, duration_ms, thumbnail_path, kind)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(id) DO UPDATE SET
                        source_url = excluded.source_url, title = excluded.title,
                        artist = excluded.artist, channel = excluded.channel,
                        duration_ms = excluded.duration_ms, thumbnail_path = excluded.thumbnail_path,
                        kind = excluded.kind",
                    params![
                        item.descriptor.id,
                        item.descriptor.source_uri,
                        item.descriptor.title,
                        item.descriptor.artist,
                        item.descriptor.channel,
                        item.descriptor.duration_ms.map(|d| d as i64),
                        item.descriptor.thumbnail_uri,
                        kind_to_str(item.descriptor.kind),
                    ],
                )
                .map_err(|e| RepositoryError::Execute(format!("failed to upsert song: {e}")))?;

                let (status, detail) = download_state_to_parts(&item.download_state);
                tx.execute(
                    "INSERT INTO queue_items
                        (song_id, requester, requester_key, origin_channel, priority, position,
                         download_status, download_detail, added_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        item.descriptor.id,
                        item.requester,
                        item.requester_key,
                        item.origin_channel,
                        priority_to_str(item.priority),
                        position as i64,
                        status,
                        detail,
                        item.added_at as i64,
                    ],
                )
                .map_err(|e| RepositoryError::Execute(format!("failed to insert queue item: {e}")))?;
            }

            tx.commit()
                .map_err(|e| RepositoryError::Execute(format!("failed to commit: {e}")))?;
            Ok(())
        })
        .await
    }

    async fn load_playback_snapshot(&self) -> Result<Option<PlaybackSnapshot>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT current_song_id, current_file_path, is_playing, is_paused,
                            start_time_ms, paused_at_ms, seek_position_ms, songs_played
                     FROM playback_state WHERE id = 0",
                )
                .map_err(|e| RepositoryError::Prepare(e.to_string()))?;

            let result = stmt.query_row([], |row| {
                let is_playing: i64 = row.get(2)?;
                let is_paused: i64 = row.get(3)?;
                let phase = if is_paused != 0 {
                    Phase::Paused
                } else if is_playing != 0 {
                    Phase::Playing
                } else {
                    Phase::Idle
                };
                Ok(PlaybackSnapshot {
                    current_descriptor_id: row.get(0)?,
                    current_file_path: row.get(1)?,
                    phase,
                    started_at_ms: row.get(4)?,
                    paused_at_ms: row.get(5)?,
                    seek_offset_ms: row.get::<_, i64>(6)? as u64,
                    songs_played_counter: row.get::<_, i64>(7)? as u64,
                })
            });

            match result {
                Ok(snapshot) => Ok(Some(snapshot)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(RepositoryError::Read(e.to_string())),
            }
        })
        .await
    }

    async fn persist_playback_snapshot(&self, snapshot: &PlaybackSnapshot) -> Result<()> {
        let snapshot = snapshot.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO playback_state
                    (id, current_song_id, current_file_path, is_playing, is_paused,
                     start_time_ms, paused_at_ms, seek_position_ms, songs_played)
                 VALUES (0, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    current_song_id = excluded.current_song_id,
                    current_file_path = excluded.current_file_path,
                    is_playing = excluded.is_playing,
                    is_paused = excluded.is_paused,
                    start_time_ms = excluded.start_time_ms,
                    paused_at_ms = excluded.paused_at_ms,
                    seek_position_ms = excluded.seek_position_ms,
                    songs_played = excluded.songs_played",
                params![
                    snapshot.current_descriptor_id,
                    snapshot.current_file_path,
                    matches!(snapshot.phase, Phase::Playing) as i64,
                    matches!(snapshot.phase, Phase::Paused) as i64,
                    snapshot.started_at_ms,
                    snapshot.paused_at_ms,
                    snapshot.seek_offset_ms as i64,
                    snapshot.songs_played_counter as i64,
                ],
            )
            .map_err(|e| RepositoryError::Execute(format!("failed to persist snapshot: {e}")))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cueline_core::TrackKind;

    fn temp_repo() -> (tempfile::TempDir, SqliteRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = SqliteRepository::open(&dir.path().join("cueline.db")).unwrap();
        (dir, repo)
    }

    #[tokio::test]
    async fn round_trips_playback_snapshot() {
        let (_dir, repo) = temp_repo();
        let snapshot = PlaybackSnapshot {
            current_descriptor_id: Some("abc".into()),
            current_file_path: Some("/tmp/abc.mp3".into()),
            phase: Phase::Playing,
            started_at_ms: Some(1000),
            paused_at_ms: None,
            seek_offset_ms: 500,
            songs_played_counter: 3,
        };
        repo.persist_playback_snapshot(&snapshot).await.unwrap();
        let loaded = repo.load_playback_snapshot().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn persist_queue_replaces_atomically() {
        let (_dir, repo) = temp_repo();
        let descriptor = TrackDescriptor::new("https://example.com/a", TrackKind::Remote);
        let item = QueueItem::new(descriptor, "alice", "chat", Priority::Normal, 1);
        repo.persist_queue(&[item.clone()]).await.unwrap();
        let loaded = repo.load_queue().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].descriptor.id, item.descriptor.id);

        repo.persist_queue(&[]).await.unwrap();
        assert!(repo.load_queue().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_song_returns_none_when_absent() {
        let (_dir, repo) = temp_repo();
        assert!(repo.get_song("missing").await.unwrap().is_none());
    }
}
