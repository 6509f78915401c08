use thiserror::Error;

/// Errors surfaced by the engine's fallible entry points.
///
/// Rendering itself never fails; degraded output is reported through
/// [`Diagnostic`](crate::diagnostics::Diagnostic) instead.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
