use cueline_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("nothing is currently playing")]
    NotPlaying,
    #[error("nothing is currently paused")]
    NotPaused,
    #[error("no track is current")]
    NoCurrentTrack,
    #[error("seek position is outside the track duration")]
    InvalidSeek,
    #[error("volume must be between 0 and 100")]
    InvalidVolume,
    #[error(transparent)]
    Player(#[from] cueline_player::PlayerError),
    #[error(transparent)]
    Repository(#[from] cueline_repository::RepositoryError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

impl From<OrchestratorError> for CoreError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::NotPlaying | OrchestratorError::NotPaused | OrchestratorError::NoCurrentTrack => {
                CoreError::InvalidRequest(err.to_string())
            }
            OrchestratorError::InvalidSeek | OrchestratorError::InvalidVolume => CoreError::InvalidRequest(err.to_string()),
            OrchestratorError::Player(e) => e.into(),
            OrchestratorError::Repository(e) => e.into(),
        }
    }
}
