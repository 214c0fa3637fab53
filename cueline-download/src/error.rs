#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("not resolvable: {0}")]
    NotResolvable(String),

    #[error("permanently rejected: {0}")]
    PermanentRejected(String),

    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("download retries exhausted: {0}")]
    RetriesExhausted(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<DownloadError> for cueline_core::CoreError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::NotResolvable(msg) => cueline_core::CoreError::NotResolvable(msg),
            DownloadError::PermanentRejected(msg) => cueline_core::CoreError::PermanentRejected(msg),
            DownloadError::ToolUnavailable(msg) => cueline_core::CoreError::ToolUnavailable(msg),
            DownloadError::RetriesExhausted(msg) => cueline_core::CoreError::TransientNetwork(msg),
            DownloadError::Other(e) => cueline_core::CoreError::Other(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
