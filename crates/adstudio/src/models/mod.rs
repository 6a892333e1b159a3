//! Domain records shared by the store, the stages and the event stream.
//!
//! Everything here is serde-serializable; the job store persists the nested
//! results as JSON columns.

pub mod avatar;
pub mod events;
pub mod job;
pub mod qc;
pub mod review;
pub mod script;
pub mod storyboard;
pub mod video;

pub use avatar::AvatarVariant;
pub use events::{EventKind, LogLevel, PipelineEvent};
pub use job::{Job, JobProgress, JobStatus, JobStep, JobUpdate};
pub use qc::{QcScore, StoryboardQcReport, VideoQcDimension, VideoQcReport, QC_REPORT_VERSION};
pub use review::{Review, ReviewDecision, ReviewStatus};
pub use script::{AvatarProfile, Scene, ScriptRequest, VideoScript};
pub use storyboard::StoryboardResult;
pub use video::{QcRewrite, VideoResult, VideoVariant};
