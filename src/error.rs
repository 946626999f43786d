use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Discriminant shared by lifecycle events and HTTP error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Validation,
    Busy,
    Remote,
    Transport,
    Storage,
}

/// Raised synchronously by `submit`; no job is started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("a generation job is already running")]
    Busy,
}

impl SubmitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubmitError::Configuration(_) => ErrorKind::Configuration,
            SubmitError::Validation(_) => ErrorKind::Validation,
            SubmitError::Busy => ErrorKind::Busy,
        }
    }
}

/// Terminal failure of a running job. The message is kept verbatim for display.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("remote error: {0}")]
    Remote(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Remote(_) => ErrorKind::Remote,
            PipelineError::Transport(_) => ErrorKind::Transport,
            PipelineError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            PipelineError::Remote(m) | PipelineError::Transport(m) | PipelineError::Storage(m) => m,
        }
    }
}

/// What the caller receives in a `Failed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<PipelineError> for ErrorDetail {
    fn from(err: PipelineError) -> Self {
        let kind = err.kind();
        let message = match err {
            PipelineError::Remote(m) | PipelineError::Transport(m) | PipelineError::Storage(m) => m,
        };
        Self { kind, message }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<TransportError> for PipelineError {
    fn from(err: TransportError) -> Self {
        PipelineError::Transport(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
