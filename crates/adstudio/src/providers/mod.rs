//! External collaborators: generation models, the QC judge and the prompt
//! rewriter. Implementations live outside this crate; the pipeline only
//! sees these traits.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::media::MediaTool;
use crate::models::{ScriptRequest, VideoScript};

pub mod retry;

pub use retry::RetryPolicy;

/// Failure reported by an external model call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExternalCallError {
    /// The remote API answered with an error status.
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    #[error("{0}")]
    Other(String),
}

impl ExternalCallError {
    pub fn api(code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Api { code, .. } => Some(*code),
            Self::Other(_) => None,
        }
    }
}

pub type ProviderResult<T> = Result<T, ExternalCallError>;

/// Binary reference handed to a model alongside the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceAsset {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ReferenceAsset {
    pub fn new(bytes: Vec<u8>, mime_type: &str) -> Self {
        Self {
            bytes,
            mime_type: mime_type.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedScript {
    pub script: VideoScript,
    pub product_image: Vec<u8>,
    pub product_mime: String,
}

#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub references: Vec<ReferenceAsset>,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub prompt: String,
    pub first_frame: Option<ReferenceAsset>,
    /// At most three: avatar, product, previous scene's last frame.
    pub references: Vec<ReferenceAsset>,
    pub num_variants: u32,
    pub seed: u32,
    pub aspect_ratio: String,
    pub duration_seconds: u32,
}

#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    async fn generate_script(&self, request: &ScriptRequest) -> ProviderResult<GeneratedScript>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_avatars(&self, prompt: &str, count: u32) -> ProviderResult<Vec<Vec<u8>>>;

    async fn generate_storyboard(&self, request: &ImageRequest) -> ProviderResult<Vec<u8>>;
}

#[async_trait]
pub trait VideoGenerator: Send + Sync {
    /// Returns one encoded clip per variant.
    async fn generate_videos(&self, request: &VideoRequest) -> ProviderResult<Vec<Vec<u8>>>;
}

/// Judge model. Verdicts come back as raw JSON and are parsed by the QC
/// service.
#[async_trait]
pub trait QcJudge: Send + Sync {
    async fn judge_storyboard(
        &self,
        avatar: &ReferenceAsset,
        product: &ReferenceAsset,
        candidate: &ReferenceAsset,
    ) -> ProviderResult<Value>;

    async fn judge_video(
        &self,
        candidate: &ReferenceAsset,
        avatar: &ReferenceAsset,
        product: &ReferenceAsset,
    ) -> ProviderResult<Value>;
}

#[async_trait]
pub trait PromptRewriter: Send + Sync {
    async fn rewrite(&self, prompt: &str, feedback: &str) -> ProviderResult<String>;
}

/// Every external collaborator the engine needs, shared across services.
#[derive(Clone)]
pub struct Collaborators {
    pub scripts: Arc<dyn ScriptGenerator>,
    pub images: Arc<dyn ImageGenerator>,
    pub videos: Arc<dyn VideoGenerator>,
    pub judge: Arc<dyn QcJudge>,
    pub rewriter: Arc<dyn PromptRewriter>,
    pub media: Arc<dyn MediaTool>,
}
