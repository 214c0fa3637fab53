//! Core data model: track descriptors, queue items, and the playback snapshot.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where a track's bytes currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackKind {
    Remote,
    LocalFile,
}

/// Immutable once sealed by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackDescriptor {
    pub id: String,
    pub source_uri: String,
    pub title: String,
    pub artist: String,
    pub channel: String,
    pub duration_ms: Option<u64>,
    pub thumbnail_uri: Option<String>,
    pub kind: TrackKind,
}

impl TrackDescriptor {
    /// Builds a descriptor from a canonical source URI, deriving a stable id.
    pub fn new(source_uri: impl Into<String>, kind: TrackKind) -> Self {
        let source_uri = source_uri.into();
        let id = stable_id(&source_uri);
        Self {
            id,
            source_uri,
            title: String::new(),
            artist: String::new(),
            channel: String::new(),
            duration_ms: None,
            thumbnail_uri: None,
            kind,
        }
    }
}

/// Canonicalizes a URI (lower-cased scheme/host, tracking params stripped)
/// and hashes it to a stable 32-hex-char id. Two URIs that canonicalize
/// identically collide on id by design.
pub fn stable_id(source_uri: &str) -> String {
    let canonical = canonicalize(source_uri);
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(&digest[..16])
}

const TRACKING_PARAMS: &[&str] = &["utm_source", "utm_medium", "utm_campaign", "si", "feature"];

fn canonicalize(uri: &str) -> String {
    let Some((scheme_host, rest)) = uri.split_once("://") else {
        return uri.to_lowercase();
    };
    let (authority, path_and_query) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    let (path, query) = match path_and_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_and_query, None),
    };
    let mut canonical = format!("{}://{}{}", scheme_host.to_lowercase(), authority.to_lowercase(), path);
    if let Some(query) = query {
        let mut kept: Vec<&str> = query
            .split('&')
            .filter(|pair| {
                let key = pair.split('=').next().unwrap_or("");
                !TRACKING_PARAMS.contains(&key)
            })
            .collect();
        kept.sort_unstable();
        if !kept.is_empty() {
            canonical.push('?');
            canonical.push_str(&kept.join("&"));
        }
    }
    canonical
}

/// Ordering class for queue items. `System` > `Vip` > `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Priority {
    Normal,
    Vip,
    System,
}

/// Monotonic lifecycle of a queued item's backing file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "detail")]
pub enum DownloadState {
    Pending,
    Inflight,
    Ready(String),
    Failed(String),
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Ready(_) | DownloadState::Failed(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub descriptor: TrackDescriptor,
    pub requester: String,
    pub requester_key: Option<String>,
    pub origin_channel: String,
    pub priority: Priority,
    pub download_state: DownloadState,
    pub added_at: u64,
}

impl QueueItem {
    pub fn new(
        descriptor: TrackDescriptor,
        requester: impl Into<String>,
        origin_channel: impl Into<String>,
        priority: Priority,
        added_at: u64,
    ) -> Self {
        Self {
            descriptor,
            requester: requester.into(),
            requester_key: None,
            origin_channel: origin_channel.into(),
            priority,
            download_state: DownloadState::Pending,
            added_at,
        }
    }
}

/// Playback phase. No terminal state: the orchestrator runs continuously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Idle,
    Playing,
    Paused,
}

/// Persisted singleton capturing enough state to resume phase and pointer
/// after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub current_descriptor_id: Option<String>,
    pub current_file_path: Option<String>,
    pub phase: Phase,
    pub started_at_ms: Option<i64>,
    pub paused_at_ms: Option<i64>,
    pub seek_offset_ms: u64,
    pub songs_played_counter: u64,
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            current_descriptor_id: None,
            current_file_path: None,
            phase: Phase::Idle,
            started_at_ms: None,
            paused_at_ms: None,
            seek_offset_ms: 0,
            songs_played_counter: 0,
        }
    }
}
