//! Dependency container built once at startup. Everything the outer
//! surfaces need goes through [`Engine`].

use std::sync::Arc;

use futures_util::Stream;
use log::{info, warn};
use serde_json::json;

use crate::broadcast::{EventBroadcaster, StreamFrame, Subscription};
use crate::config::Settings;
use crate::db::job_repo::JobFilter;
use crate::db::Database;
use crate::error::Result;
use crate::jobs::{JobError, JobListResponse, JobStore, LogEntry, TaskRunner};
use crate::models::{
    EventKind, Job, JobStatus, JobStep, JobUpdate, PipelineEvent, Review, ReviewDecision,
    ScriptRequest, StoryboardResult,
};
use crate::pipeline::{PipelineConfig, PipelineService, StepOptions, StepOutput};
use crate::providers::{Collaborators, RetryPolicy};
use crate::review::ReviewService;

pub struct Engine {
    settings: Settings,
    store: Arc<JobStore>,
    broadcaster: EventBroadcaster,
    runner: TaskRunner,
    pipeline: Arc<PipelineService>,
    reviews: ReviewService,
}

impl Engine {
    pub fn new(settings: Settings, database: Database, collaborators: Collaborators) -> Self {
        let store = Arc::new(JobStore::new(database.clone()));
        let broadcaster = EventBroadcaster::new();
        let reviews = ReviewService::new(database);
        let pipeline = Arc::new(PipelineService::new(
            Arc::new(PipelineConfig::from_settings(&settings)),
            Arc::clone(&store),
            broadcaster.clone(),
            &collaborators,
            RetryPolicy::from_config(&settings.retry),
            reviews.clone(),
        ));

        Self {
            settings,
            store,
            broadcaster,
            runner: TaskRunner::new(),
            pipeline,
            reviews,
        }
    }

    /// Opens the configured database, or an in-memory one when no home
    /// directory can be resolved.
    pub fn open(settings: Settings, collaborators: Collaborators) -> Result<Self> {
        let database = match settings.database_path() {
            Some(path) => Database::open(&path)?,
            None => {
                log::warn!("No database path available, using an in-memory database");
                Database::open_in_memory()?
            }
        };
        Ok(Self::new(settings, database, collaborators))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pipeline(&self) -> &PipelineService {
        &self.pipeline
    }

    pub fn reviews(&self) -> &ReviewService {
        &self.reviews
    }

    // ─── Jobs ───────────────────────────────────────────────────────────────

    pub fn create_job(&self, request: ScriptRequest) -> Result<Job> {
        Ok(self.store.create(request)?)
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        Ok(self.store.get(job_id)?)
    }

    pub fn list_jobs(&self, filter: &JobFilter) -> Result<JobListResponse> {
        Ok(self.store.list(filter)?)
    }

    pub fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<Job> {
        Ok(self.store.update(job_id, update)?)
    }

    pub fn job_logs(&self, job_id: &str) -> Result<Vec<LogEntry>> {
        Ok(self.store.logs(job_id)?)
    }

    /// Creates a job and starts its pipeline in the background.
    pub fn submit(&self, request: ScriptRequest) -> Result<Job> {
        let job = self.store.create(request)?;
        self.start_pipeline(&job.job_id)?;
        Ok(job)
    }

    /// Starts the full pipeline for a pending job.
    pub fn start_pipeline(&self, job_id: &str) -> Result<()> {
        let job = self.store.require(job_id)?;
        if job.status != JobStatus::Pending {
            return Err(JobError::InvalidTransition {
                job_id: job_id.to_string(),
                from: job.status,
                to: JobStatus::Running,
            }
            .into());
        }

        let pipeline = Arc::clone(&self.pipeline);
        let id = job.job_id.clone();
        let request = job.request;
        self.runner.spawn(job_id, move |cancel| async move {
            pipeline.run_full_pipeline(&id, &request, cancel).await;
        });
        info!("Started pipeline for job {}", job_id);
        Ok(())
    }

    /// Marks the job cancelled and stops its task. Returns false when the
    /// job had already finished.
    pub fn cancel_job(&self, job_id: &str) -> Result<bool> {
        let cancelled = self.store.cancel(job_id)?;
        self.runner.cancel(job_id);
        Ok(cancelled)
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.runner.is_running(job_id)
    }

    // ─── Stage control ──────────────────────────────────────────────────────

    pub async fn select_avatar(&self, job_id: &str, variant_index: u32) -> Result<String> {
        Ok(self.pipeline.select_avatar(job_id, variant_index).await?)
    }

    pub async fn run_step(
        &self,
        job_id: &str,
        step: JobStep,
        options: StepOptions,
    ) -> Result<StepOutput> {
        Ok(self.pipeline.run_step(job_id, step, options).await?)
    }

    pub async fn regenerate_storyboard_scene(
        &self,
        job_id: &str,
        scene_number: u32,
        custom_prompt: Option<String>,
    ) -> Result<StoryboardResult> {
        Ok(self
            .pipeline
            .regenerate_storyboard_scene(job_id, scene_number, custom_prompt)
            .await?)
    }

    pub async fn select_video_variant(
        &self,
        job_id: &str,
        scene_number: u32,
        variant_index: u32,
    ) -> Result<String> {
        Ok(self
            .pipeline
            .select_video_variant(job_id, scene_number, variant_index)
            .await?)
    }

    // ─── Events ─────────────────────────────────────────────────────────────

    pub fn events(&self, job_id: &str) -> Subscription {
        self.broadcaster.subscribe(job_id)
    }

    /// SSE-ready stream with the configured keepalive. A job that already
    /// finished yields its terminal event once and the stream ends.
    pub fn event_stream(&self, job_id: &str) -> impl Stream<Item = StreamFrame> + Send + 'static {
        // Subscribe before reading the job so a finish in between is not missed.
        let subscription = self.broadcaster.subscribe(job_id);
        let finished = match self.store.get(job_id) {
            Ok(job) => job.as_ref().and_then(terminal_event),
            Err(e) => {
                warn!("Could not read job {} for event stream: {}", job_id, e);
                None
            }
        };
        EventBroadcaster::stream_from(subscription, finished, self.settings.events.keepalive())
    }

    // ─── Review ─────────────────────────────────────────────────────────────

    pub fn submit_review(&self, job_id: &str, decision: ReviewDecision) -> Result<Review> {
        Ok(self.reviews.submit_decision(job_id, decision)?)
    }

    pub fn pending_reviews(&self) -> Result<Vec<Review>> {
        Ok(self.reviews.pending_reviews()?)
    }

    /// Cancels every running pipeline and waits for the tasks to stop.
    pub async fn shutdown(&self) {
        info!("Shutting down with {} running pipeline(s)", self.runner.running_count());
        self.runner.shutdown().await;
    }
}

/// The event a finished job last emitted, rebuilt from its stored record.
fn terminal_event(job: &Job) -> Option<PipelineEvent> {
    match job.status {
        JobStatus::Completed => Some(PipelineEvent::new(
            EventKind::JobCompleted,
            &job.job_id,
            json!({ "final_video_path": job.final_video_path.as_deref().unwrap_or_default() }),
        )),
        JobStatus::Failed | JobStatus::Cancelled => Some(PipelineEvent::new(
            EventKind::JobFailed,
            &job.job_id,
            json!({ "error": job.error.as_deref().unwrap_or(job.status.as_str()) }),
        )),
        JobStatus::Pending | JobStatus::Running => None,
    }
}
