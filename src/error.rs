use thiserror::Error;

use crate::generator::{ExtractError, GeneratorError};
use crate::state_machine::{StageName, WorkflowStatus};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PressroomError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Invalid transition for workflow {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: WorkflowStatus,
        to: WorkflowStatus,
    },

    #[error("Stage {0} already ran in this attempt")]
    StageReentry(StageName),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: StageName,
        #[source]
        source: Box<PressroomError>,
    },

    #[error("Workflow {id} failed after {retries} retries: {message}")]
    WorkflowFailed {
        id: String,
        retries: u32,
        message: String,
    },

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Model output could not be decoded: {0}")]
    Extract(#[from] ExtractError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Generator error: {0}")]
    Generator(#[from] GeneratorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PressroomError {
    /// The stage a failure originated from, if any.
    pub fn stage(&self) -> Option<StageName> {
        match self {
            PressroomError::Stage { stage, .. } => Some(*stage),
            PressroomError::StageReentry(stage) => Some(*stage),
            _ => None,
        }
    }
}
