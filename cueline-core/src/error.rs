//! Error taxonomy shared by every component of the playback core.

/// Errors surfaced across component boundaries.
///
/// Component crates define their own narrower error types and convert into
/// this one at the boundary (`#[from]`), rather than returning `CoreError`
/// directly from deep call sites.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("duplicate request: {0}")]
    DuplicateRequest(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not resolvable: {0}")]
    NotResolvable(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("permanently rejected: {0}")]
    PermanentRejected(String),

    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("no player backend available")]
    BackendUnavailable,

    #[error("ipc request timed out")]
    IpcTimeout,

    #[error("ipc disconnected: {0}")]
    IpcDisconnect(String),

    #[error("persistence error: {0}")]
    PersistenceError(String),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("invalid move: {0}")]
    InvalidMove(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
