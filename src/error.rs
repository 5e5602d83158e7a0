//! Error types for the decision pipeline

use crate::types::decision::ModelVersion;
use thiserror::Error;

/// An inbound record that cannot become a `Transaction`.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("malformed transaction payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl RecordError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Model failures, split between startup loading and per-call scoring.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Raised while loading; the process must not serve traffic.
    #[error("{version} model unavailable at {path}: {reason}")]
    Unavailable {
        version: ModelVersion,
        path: String,
        reason: String,
    },

    #[error("{version} model inference failed: {reason}")]
    Inference {
        version: ModelVersion,
        reason: String,
    },

    #[error("{version} model returned probability {value} outside [0, 1]")]
    OutOfRange { version: ModelVersion, value: f64 },
}

/// Failure of a single record inside the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Model(#[from] ModelError),

    /// A stage panicked; caught at the orchestrator boundary.
    #[error("internal error: {0}")]
    Internal(String),
}
