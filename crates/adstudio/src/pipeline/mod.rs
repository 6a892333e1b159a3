pub mod config;
pub mod error;
pub mod progress;
pub mod service;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use progress::{BroadcastProgress, NoopProgress, SceneEvent, SceneProgress, SceneStage};
pub use service::{validate_script, PipelineService, StepOptions, StepOutput};
