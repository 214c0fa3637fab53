use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] cueline_core::CoreError),
    #[error(transparent)]
    Resolve(#[from] cueline_resolver::ResolveError),
    #[error(transparent)]
    Repository(#[from] cueline_repository::RepositoryError),
    #[error(transparent)]
    Orchestrator(#[from] cueline_orchestrator::OrchestratorError),
    #[error(transparent)]
    Download(#[from] cueline_download::DownloadError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        use cueline_core::CoreError;
        match self {
            ApiError::Core(CoreError::DuplicateRequest(_)) => StatusCode::CONFLICT,
            ApiError::Core(CoreError::InvalidRequest(_))
            | ApiError::Core(CoreError::OutOfRange(_))
            | ApiError::Core(CoreError::InvalidMove(_)) => StatusCode::BAD_REQUEST,
            ApiError::Resolve(cueline_resolver::ResolveError::NotResolvable(_)) => StatusCode::BAD_REQUEST,
            ApiError::Orchestrator(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Endpoints never propagate a failure past enqueue — this conversion is
/// only reached by the synchronous request/response surface named in
/// spec.md §6; anything after enqueue is conveyed through the SSE stream.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
