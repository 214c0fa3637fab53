#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("no player backend available: {0}")]
    BackendUnavailable(String),

    #[error("ipc request timed out")]
    IpcTimeout,

    #[error("ipc disconnected: {0}")]
    IpcDisconnect(String),

    #[error("player operation '{0}' is not supported by this backend")]
    Unsupported(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<PlayerError> for cueline_core::CoreError {
    fn from(err: PlayerError) -> Self {
        match err {
            PlayerError::BackendUnavailable(_) => cueline_core::CoreError::BackendUnavailable,
            PlayerError::IpcTimeout => cueline_core::CoreError::IpcTimeout,
            PlayerError::IpcDisconnect(msg) => cueline_core::CoreError::IpcDisconnect(msg),
            PlayerError::Unsupported(msg) => cueline_core::CoreError::InvalidRequest(msg),
            PlayerError::Other(e) => cueline_core::CoreError::Other(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
