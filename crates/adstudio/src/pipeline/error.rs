use thiserror::Error;

use crate::error::StorageError;
use crate::jobs::JobError;
use crate::media::MediaError;
use crate::providers::ExternalCallError;
use crate::qc::QcError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("{0}")]
    Timeout(String),

    #[error("Pipeline was cancelled")]
    Cancelled,

    #[error("External call failed: {0}")]
    External(#[from] ExternalCallError),

    #[error("QC failed: {0}")]
    Qc(#[from] QcError),

    #[error("Media processing failed: {0}")]
    Media(#[from] MediaError),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Invalid script: {0}")]
    InvalidScript(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl PipelineError {
    pub fn precondition(message: impl Into<String>) -> Self {
        PipelineError::Precondition(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}
