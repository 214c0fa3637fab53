use cueline_core::{Phase, TrackDescriptor};
use std::time::SystemTime;

/// Internal phase of the state machine. `Preparing` has no counterpart in
/// the persisted [`Phase`] (nothing has started yet); it collapses to
/// `Phase::Idle` when written to the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalPhase {
    Idle,
    Preparing,
    Playing,
    Paused,
}

impl InternalPhase {
    pub fn to_persisted(self) -> Phase {
        match self {
            InternalPhase::Idle | InternalPhase::Preparing => Phase::Idle,
            InternalPhase::Playing => Phase::Playing,
            InternalPhase::Paused => Phase::Paused,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CurrentTrack {
    pub descriptor: TrackDescriptor,
    pub file_path: String,
}

pub struct OrchestratorState {
    pub phase: InternalPhase,
    pub current: Option<CurrentTrack>,
    pub started_at: Option<SystemTime>,
    pub paused_at: Option<SystemTime>,
    pub seek_offset_ms: u64,
    pub songs_played: u64,
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self {
            phase: InternalPhase::Idle,
            current: None,
            started_at: None,
            paused_at: None,
            seek_offset_ms: 0,
            songs_played: 0,
        }
    }
}

/// Intent recorded immediately before an action that will make an
/// in-flight `play()` invocation resolve with `FinishReason::Stopped`, so
/// the completion handler can reinterpret that generic reason.
#[derive(Debug, Clone)]
pub enum PendingIntent {
    Skip,
    SessionReset,
    /// Fallback back-end pause: the subprocess was killed at `offset_ms`.
    Pause { offset_ms: u64 },
    /// Effects change on the fallback back-end: restart at the recorded
    /// offset. Per the preserved source ambiguity (spec §9), this always
    /// lands in `Playing`, even if the session was paused beforehand.
    EffectsRestart,
}
