use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::avatar::AvatarVariant;
use super::script::{ScriptRequest, VideoScript};
use super::storyboard::StoryboardResult;
use super::video::VideoResult;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Forward-only transitions. Cancellation is reachable from pending and
    /// running only; terminal states accept nothing but themselves.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            JobStatus::Pending => matches!(
                next,
                JobStatus::Running | JobStatus::Failed | JobStatus::Cancelled
            ),
            JobStatus::Running => matches!(
                next,
                JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
            ),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStep {
    Script,
    Avatar,
    AvatarSelection,
    Storyboard,
    Video,
    Stitch,
    Review,
}

impl JobStep {
    pub const ALL: [JobStep; 7] = [
        JobStep::Script,
        JobStep::Avatar,
        JobStep::AvatarSelection,
        JobStep::Storyboard,
        JobStep::Video,
        JobStep::Stitch,
        JobStep::Review,
    ];

    pub const TOTAL: u32 = 7;

    /// One-based position in the pipeline.
    pub fn index(&self) -> u32 {
        match self {
            JobStep::Script => 1,
            JobStep::Avatar => 2,
            JobStep::AvatarSelection => 3,
            JobStep::Storyboard => 4,
            JobStep::Video => 5,
            JobStep::Stitch => 6,
            JobStep::Review => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStep::Script => "script",
            JobStep::Avatar => "avatar",
            JobStep::AvatarSelection => "avatar_selection",
            JobStep::Storyboard => "storyboard",
            JobStep::Video => "video",
            JobStep::Stitch => "stitch",
            JobStep::Review => "review",
        }
    }
}

impl std::fmt::Display for JobStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStep::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| format!("Unknown pipeline step: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub current_step: JobStep,
    pub step_index: u32,
    #[serde(default = "default_total_steps")]
    pub total_steps: u32,
    #[serde(default)]
    pub detail: String,
}

fn default_total_steps() -> u32 {
    JobStep::TOTAL
}

impl JobProgress {
    pub fn at(step: JobStep, detail: &str) -> Self {
        Self {
            current_step: step,
            step_index: step.index(),
            total_steps: JobStep::TOTAL,
            detail: detail.to_string(),
        }
    }
}

/// One end-to-end advertisement request and everything produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    /// Key for the run's artifact directory.
    pub run_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub request: ScriptRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<VideoScript>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_variants: Option<Vec<AvatarVariant>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storyboard_results: Option<Vec<StoryboardResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_results: Option<Vec<VideoResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_video_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(job_id: &str, request: ScriptRequest) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.to_string(),
            run_id: job_id.to_string(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            request,
            progress: None,
            script: None,
            avatar_variants: None,
            selected_avatar: None,
            storyboard_results: None,
            video_results: None,
            final_video_path: None,
            error: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Field patch applied by `JobStore::update`. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<JobProgress>,
    pub script: Option<VideoScript>,
    pub avatar_variants: Option<Vec<AvatarVariant>>,
    pub selected_avatar: Option<String>,
    pub storyboard_results: Option<Vec<StoryboardResult>>,
    pub video_results: Option<Vec<VideoResult>>,
    pub final_video_path: Option<String>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn failed(status: JobStatus, error: &str) -> Self {
        Self {
            status: Some(status),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    /// Applies the patch without checking the status transition.
    pub fn apply(self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(progress) = self.progress {
            job.progress = Some(progress);
        }
        if let Some(script) = self.script {
            job.script = Some(script);
        }
        if let Some(variants) = self.avatar_variants {
            job.avatar_variants = Some(variants);
        }
        if let Some(selected) = self.selected_avatar {
            job.selected_avatar = Some(selected);
        }
        if let Some(results) = self.storyboard_results {
            job.storyboard_results = Some(results);
        }
        if let Some(results) = self.video_results {
            job.video_results = Some(results);
        }
        if let Some(path) = self.final_video_path {
            job.final_video_path = Some(path);
        }
        if let Some(error) = self.error {
            job.error = Some(error);
        }
    }
}
