pub mod broadcast;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod media;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod qc;
pub mod review;
pub mod scene;
pub mod storage;
pub mod telemetry;

pub use broadcast::{EventBroadcaster, JobEvents, StreamFrame, Subscription};
pub use config::{load_settings, load_settings_from_str, Settings};
pub use db::Database;
pub use engine::Engine;
pub use error::{AdStudioError, ConfigError, Result, StorageError};
pub use jobs::{JobError, JobStore, TaskRunner};
pub use media::{FfmpegCli, MediaError, MediaTool, StitchService, Transition, TransitionKind};
pub use models::{
    Job, JobStatus, JobStep, PipelineEvent, Review, ReviewDecision, ScriptRequest, VideoScript,
};
pub use pipeline::{PipelineConfig, PipelineError, PipelineService, StepOptions, StepOutput};
pub use providers::{Collaborators, ExternalCallError, RetryPolicy};
pub use qc::QcService;
pub use review::ReviewService;
pub use storage::RunStorage;
pub use telemetry::init_tracing;
