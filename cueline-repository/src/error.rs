#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("failed to prepare statement: {0}")]
    Prepare(String),

    #[error("failed to execute statement: {0}")]
    Execute(String),

    #[error("failed to read row: {0}")]
    Read(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<RepositoryError> for cueline_core::CoreError {
    fn from(err: RepositoryError) -> Self {
        cueline_core::CoreError::PersistenceError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
