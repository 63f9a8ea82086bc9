use super::Stage;
use crate::generate::ServiceError;
use thiserror::Error;

/// Errors raised by the orchestrator and the client setup.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage was triggered without its required upstream artifacts.
    #[error("cannot run {stage}: {reason}")]
    Precondition { stage: Stage, reason: String },

    /// The generation call failed; pipeline state was left untouched.
    #[error("{stage} generation failed: {error}")]
    Service { stage: Stage, error: ServiceError },

    /// The generation client cannot be used at all until this is fixed.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    pub fn precondition(stage: Stage, reason: impl Into<String>) -> Self {
        Self::Precondition {
            stage,
            reason: reason.into(),
        }
    }

    /// Short machine-readable label used in history entries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Precondition { .. } => "precondition",
            Self::Service { .. } => "service",
            Self::Configuration(_) => "configuration",
        }
    }
}
