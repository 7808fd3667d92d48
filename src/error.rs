//! Crate-wide error type.
//!
//! Per-entry and per-asset failures are reported through these variants and
//! caught by the orchestrator; only structural failures abort a whole run.
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or malformed index, unknown list, unbound placeholder.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The generation service answered without the fields we need.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(
        "timed out waiting for history of prompt_id={prompt_id} (last error: {})",
        .last_error.as_deref().unwrap_or("none")
    )]
    Timeout {
        prompt_id: String,
        last_error: Option<String>,
    },

    #[error("missing dependency: {0}")]
    DependencyMissing(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "imaging")]
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl AppError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Errors that must stop a batch instead of skipping to the next asset.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, AppError::DependencyMissing(_))
    }
}
