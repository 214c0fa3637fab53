#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("not resolvable: {0}")]
    NotResolvable(String),

    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("permanently rejected: {0}")]
    PermanentRejected(String),

    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ResolveError> for cueline_core::CoreError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotResolvable(msg) => cueline_core::CoreError::NotResolvable(msg),
            ResolveError::TransientNetwork(msg) => cueline_core::CoreError::TransientNetwork(msg),
            ResolveError::PermanentRejected(msg) => cueline_core::CoreError::PermanentRejected(msg),
            ResolveError::ToolUnavailable(msg) => cueline_core::CoreError::ToolUnavailable(msg),
            ResolveError::Other(e) => cueline_core::CoreError::Other(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
