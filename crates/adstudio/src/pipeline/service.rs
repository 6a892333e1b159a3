//! The job state machine: SCRIPT → AVATAR → AVATAR_SELECTION → STORYBOARD →
//! VIDEO → STITCH → REVIEW.
//!
//! Every stage reads its inputs from the persisted job and the run
//! directory, so any stage can be re-run on its own through
//! [`PipelineService::run_step`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use super::config::PipelineConfig;
use super::error::PipelineError;
use super::progress::{BroadcastProgress, SceneProgress};
use crate::broadcast::{EventBroadcaster, JobEvents};
use crate::jobs::{JobError, JobStore};
use crate::media::{StitchService, Transition, TransitionKind};
use crate::models::{
    AvatarVariant, Job, JobStatus, JobStep, JobUpdate, LogLevel, Review, ScriptRequest,
    StoryboardResult, VideoResult, VideoScript,
};
use crate::providers::{
    Collaborators, ImageGenerator, ReferenceAsset, RetryPolicy, ScriptGenerator,
};
use crate::qc::QcService;
use crate::review::ReviewService;
use crate::scene::prompts;
use crate::scene::{
    StoryboardInputs, StoryboardOptions, StoryboardStage, VideoInputs, VideoOptions, VideoStage,
};
use crate::storage::RunStorage;

const AVATAR_VARIANTS_DIR: &str = "avatar_variants";
const AVATAR_SELECTED_FILE: &str = "avatar_selected.png";

/// Overrides for a single-stage run.
#[derive(Debug, Clone, Default)]
pub struct StepOptions {
    /// Required by `avatar_selection`.
    pub variant_index: Option<u32>,
    pub qc_threshold: Option<u32>,
    pub max_regen: Option<u32>,
    pub include_composition: Option<bool>,
    pub custom_prompts: HashMap<u32, String>,
    pub num_variants: Option<u32>,
    pub seed: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    Script(VideoScript),
    Avatars(Vec<AvatarVariant>),
    AvatarSelected(String),
    Storyboard(Vec<StoryboardResult>),
    Video(Vec<VideoResult>),
    Stitched(String),
    Review(Review),
}

pub struct PipelineService {
    config: Arc<PipelineConfig>,
    store: Arc<JobStore>,
    broadcaster: EventBroadcaster,
    scripts: Arc<dyn ScriptGenerator>,
    images: Arc<dyn ImageGenerator>,
    retry: RetryPolicy,
    storage: RunStorage,
    storyboard: StoryboardStage,
    video: VideoStage,
    stitch: StitchService,
    reviews: ReviewService,
}

impl PipelineService {
    pub fn new(
        config: Arc<PipelineConfig>,
        store: Arc<JobStore>,
        broadcaster: EventBroadcaster,
        collaborators: &Collaborators,
        retry: RetryPolicy,
        reviews: ReviewService,
    ) -> Self {
        let storage = RunStorage::new(&config.output_dir);
        let qc = Arc::new(QcService::new(
            collaborators.judge.clone(),
            collaborators.rewriter.clone(),
            retry.clone(),
            config.storyboard_qc_threshold,
            config.video_qc_threshold,
        ));
        let storyboard = StoryboardStage::new(
            collaborators.images.clone(),
            qc.clone(),
            storage.clone(),
            retry.clone(),
            config.max_concurrent_scenes,
        );
        let video = VideoStage::new(
            collaborators.videos.clone(),
            qc,
            collaborators.media.clone(),
            storage.clone(),
            retry.clone(),
        );
        let stitch = StitchService::new(
            collaborators.media.clone(),
            storage.clone(),
            config.stitch.clone(),
        );

        Self {
            config,
            store,
            broadcaster,
            scripts: collaborators.scripts.clone(),
            images: collaborators.images.clone(),
            retry,
            storage,
            storyboard,
            video,
            stitch,
            reviews,
        }
    }

    pub fn storage(&self) -> &RunStorage {
        &self.storage
    }

    // ─── Full run ───────────────────────────────────────────────────────────

    /// Drives the job through every stage and records the terminal status.
    /// Never returns an error: failures land on the job and the event stream.
    pub async fn run_full_pipeline(
        &self,
        job_id: &str,
        request: &ScriptRequest,
        cancel: CancellationToken,
    ) -> JobStatus {
        let events = self.broadcaster.for_job(job_id);
        async {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(PipelineError::Cancelled),
                result = self.execute(job_id, request, &events, &cancel) => result,
            };
            self.finish(job_id, &events, outcome)
        }
        .instrument(info_span!("pipeline", job_id = %job_id))
        .await
    }

    async fn execute(
        &self,
        job_id: &str,
        request: &ScriptRequest,
        events: &JobEvents,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        self.store.update(job_id, JobUpdate::status(JobStatus::Running))?;
        events.job_started();
        self.milestone(job_id, events, LogLevel::Info, "Pipeline started");

        // Script
        self.begin(job_id, events, JobStep::Script, "Generating script...")?;
        let script = self
            .generate_script(job_id, request)
            .instrument(info_span!("stage", step = "script"))
            .await?;
        events.step_completed(
            JobStep::Script,
            json!({ "run_id": self.run_id(job_id)?, "num_scenes": script.scenes.len() }),
        );

        // Avatar
        self.begin(job_id, events, JobStep::Avatar, "Generating avatar variants...")?;
        let variants = self
            .generate_avatars(&self.store.require(job_id)?)
            .instrument(info_span!("stage", step = "avatar"))
            .await?;
        events.step_completed(JobStep::Avatar, json!({ "num_variants": variants.len() }));

        // Avatar selection
        self.begin(
            job_id,
            events,
            JobStep::AvatarSelection,
            "Waiting for avatar selection...",
        )?;
        self.milestone(job_id, events, LogLevel::Dim, "Waiting for avatar selection");
        let selected = self
            .wait_for_avatar_selection(job_id, cancel)
            .instrument(info_span!("stage", step = "avatar_selection"))
            .await?;
        events.step_completed(JobStep::AvatarSelection, json!({ "selected": selected }));

        // Storyboard
        self.begin(job_id, events, JobStep::Storyboard, "Generating storyboard...")?;
        let progress = BroadcastProgress::new(events.clone());
        let storyboards = self
            .generate_storyboard(
                &self.store.require(job_id)?,
                &StepOptions::default(),
                &progress,
            )
            .instrument(info_span!("stage", step = "storyboard"))
            .await?;
        events.step_completed(
            JobStep::Storyboard,
            json!({ "num_scenes": storyboards.len() }),
        );

        // Video
        self.begin(job_id, events, JobStep::Video, "Generating videos...")?;
        let videos = self
            .generate_videos(&self.store.require(job_id)?, &StepOptions::default(), &progress)
            .instrument(info_span!("stage", step = "video"))
            .await?;
        events.step_completed(JobStep::Video, json!({ "num_scenes": videos.len() }));

        // Stitch
        self.begin(job_id, events, JobStep::Stitch, "Stitching final video...")?;
        let final_path = self
            .stitch_final(&self.store.require(job_id)?)
            .instrument(info_span!("stage", step = "stitch"))
            .await?;
        events.step_completed(JobStep::Stitch, json!({ "path": final_path }));

        // Review
        self.reviews.create_review(job_id)?;
        self.store
            .set_progress(job_id, JobStep::Review, "Awaiting review")?;
        self.milestone(job_id, events, LogLevel::Info, "Final video ready for review");

        Ok(final_path)
    }

    /// Records the outcome of a full run and returns the job's final status.
    fn finish(
        &self,
        job_id: &str,
        events: &JobEvents,
        outcome: Result<String, PipelineError>,
    ) -> JobStatus {
        match outcome {
            Ok(final_path) => match self.store.update(job_id, JobUpdate::status(JobStatus::Completed)) {
                Ok(_) => {
                    info!("Pipeline completed for job {}", job_id);
                    events.job_completed(&final_path);
                    JobStatus::Completed
                }
                Err(e) => self.record_failure(job_id, events, &e.to_string()),
            },
            Err(PipelineError::Cancelled) => {
                let message = PipelineError::Cancelled.to_string();
                let result = self.store.update_with(job_id, |job| {
                    if !job.status.is_terminal() {
                        job.status = JobStatus::Cancelled;
                    }
                    job.error = Some(message.clone());
                    Ok(())
                });
                if let Err(e) = result {
                    error!("Could not record cancellation of job {}: {}", job_id, e);
                }
                info!("Pipeline cancelled for job {}", job_id);
                events.job_failed(&message);
                self.current_status(job_id, JobStatus::Cancelled)
            }
            Err(e) => self.record_failure(job_id, events, &e.to_string()),
        }
    }

    fn record_failure(&self, job_id: &str, events: &JobEvents, message: &str) -> JobStatus {
        error!("Pipeline failed for job {}: {}", job_id, message);
        let result = self.store.update_with(job_id, |job| {
            if !job.status.is_terminal() {
                job.status = JobStatus::Failed;
            }
            job.error = Some(message.to_string());
            Ok(())
        });
        if let Err(e) = result {
            error!("Could not record failure of job {}: {}", job_id, e);
        }
        self.milestone(job_id, events, LogLevel::Error, message);
        events.job_failed(message);
        self.current_status(job_id, JobStatus::Failed)
    }

    fn current_status(&self, job_id: &str, fallback: JobStatus) -> JobStatus {
        match self.store.get(job_id) {
            Ok(Some(job)) => job.status,
            _ => fallback,
        }
    }

    fn begin(
        &self,
        job_id: &str,
        events: &JobEvents,
        step: JobStep,
        detail: &str,
    ) -> Result<(), PipelineError> {
        self.store.set_progress(job_id, step, detail)?;
        events.step_started(step);
        Ok(())
    }

    /// Persists a user-facing log line and mirrors it on the event stream.
    fn milestone(&self, job_id: &str, events: &JobEvents, level: LogLevel, message: &str) {
        match self.store.add_log(job_id, level, message, None) {
            Ok(timestamp) => events.log(level, message, &timestamp.to_rfc3339()),
            Err(e) => warn!("Could not persist log for job {}: {}", job_id, e),
        }
    }

    fn run_id(&self, job_id: &str) -> Result<String, PipelineError> {
        Ok(self.store.require(job_id)?.run_id)
    }

    // ─── Avatar selection ───────────────────────────────────────────────────

    /// Resolves once a selection is recorded on the job. Wakes on every job
    /// write and re-checks at the poll interval as a fallback.
    pub async fn wait_for_avatar_selection(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let mut changes = self.store.watch(job_id);
        let deadline = Instant::now() + self.config.avatar_timeout;

        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let job = self.store.require(job_id)?;
            if let Some(selected) = job.selected_avatar {
                return Ok(selected);
            }
            if job.status == JobStatus::Cancelled {
                return Err(PipelineError::Cancelled);
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                Ok(()) = changes.changed() => {}
                _ = tokio::time::sleep(self.config.avatar_poll_interval) => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(PipelineError::Timeout(format!(
                        "Avatar selection timed out after {}s for job {}",
                        self.config.avatar_timeout.as_secs_f64(),
                        job_id
                    )));
                }
            }
        }
    }

    /// Copies the chosen variant to `avatar_selected.png` and records it,
    /// releasing a waiting pipeline.
    pub async fn select_avatar(&self, job_id: &str, variant_index: u32) -> Result<String, PipelineError> {
        let job = self.store.require(job_id)?;
        let variant = job
            .avatar_variants
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|v| v.index == variant_index)
            .ok_or_else(|| {
                PipelineError::NotFound(format!(
                    "Avatar variant {} for job {}",
                    variant_index, job_id
                ))
            })?;

        let source = self.storage.resolve(&variant.image_path);
        let dest = self
            .storage
            .copy_into(&source, &job.run_id, "", AVATAR_SELECTED_FILE)
            .await?;
        let url = self.storage.to_url_path(&dest);
        self.store.select_avatar(job_id, &url)?;
        info!("Selected avatar variant {} for job {}", variant_index, job_id);
        Ok(url)
    }

    // ─── Stages ─────────────────────────────────────────────────────────────

    async fn generate_script(
        &self,
        job_id: &str,
        request: &ScriptRequest,
    ) -> Result<VideoScript, PipelineError> {
        let run_id = self.run_id(job_id)?;
        let scripts = &self.scripts;
        let generated = self
            .retry
            .run("generate_script", move || scripts.generate_script(request))
            .await?;
        validate_script(&generated.script)?;

        let filename = format!("product_image.{}", image_extension(&generated.product_mime));
        self.storage
            .save_bytes(&run_id, "", &filename, &generated.product_image)
            .await?;

        self.store.update(
            job_id,
            JobUpdate {
                script: Some(generated.script.clone()),
                ..Default::default()
            },
        )?;
        info!(
            "Generated script '{}' with {} scenes",
            generated.script.video_title,
            generated.script.scenes.len()
        );
        Ok(generated.script)
    }

    async fn generate_avatars(&self, job: &Job) -> Result<Vec<AvatarVariant>, PipelineError> {
        let script = job
            .script
            .as_ref()
            .ok_or_else(|| PipelineError::precondition("Script must be generated before avatars"))?;
        let prompt = prompts::avatar_prompt(&script.avatar_profile);
        let prompt = prompt.as_str();
        let images = &self.images;
        let count = self.config.max_avatar_variants;
        let generated = self
            .retry
            .run("generate_avatars", move || images.generate_avatars(prompt, count))
            .await?;

        let mut variants = Vec::with_capacity(generated.len());
        for (i, bytes) in generated.iter().enumerate() {
            let path = self
                .storage
                .save_bytes(&job.run_id, AVATAR_VARIANTS_DIR, &format!("variant_{}.png", i), bytes)
                .await?;
            variants.push(AvatarVariant {
                index: i as u32,
                image_path: self.storage.to_url_path(&path),
            });
        }

        self.store.update(
            &job.job_id,
            JobUpdate {
                avatar_variants: Some(variants.clone()),
                ..Default::default()
            },
        )?;
        info!("Generated {} avatar variants for run {}", variants.len(), job.run_id);
        Ok(variants)
    }

    async fn generate_storyboard(
        &self,
        job: &Job,
        options: &StepOptions,
        progress: &dyn SceneProgress,
    ) -> Result<Vec<StoryboardResult>, PipelineError> {
        let (script, avatar_path) = match (&job.script, &job.selected_avatar) {
            (Some(script), Some(avatar)) => (script, avatar),
            _ => {
                return Err(PipelineError::precondition(
                    "Script and avatar selection required before storyboard",
                ))
            }
        };
        let (avatar, product) = self.references(&job.run_id, avatar_path).await?;
        let inputs = StoryboardInputs {
            run_id: &job.run_id,
            script,
            avatar: &avatar,
            product: &product,
        };
        let results = self
            .storyboard
            .run(&inputs, &self.storyboard_options(options), progress)
            .await?;

        self.store.update(
            &job.job_id,
            JobUpdate {
                storyboard_results: Some(results.clone()),
                ..Default::default()
            },
        )?;
        Ok(results)
    }

    async fn generate_videos(
        &self,
        job: &Job,
        options: &StepOptions,
        progress: &dyn SceneProgress,
    ) -> Result<Vec<VideoResult>, PipelineError> {
        let (script, storyboards, avatar_path) =
            match (&job.script, &job.storyboard_results, &job.selected_avatar) {
                (Some(script), Some(storyboards), Some(avatar)) if !storyboards.is_empty() => {
                    (script, storyboards, avatar)
                }
                _ => {
                    return Err(PipelineError::precondition(
                        "Storyboard must be generated before videos",
                    ))
                }
            };
        let (avatar, product) = self.references(&job.run_id, avatar_path).await?;
        let inputs = VideoInputs {
            run_id: &job.run_id,
            script,
            storyboards,
            avatar: &avatar,
            product: &product,
        };
        let video_options = VideoOptions {
            threshold: options.qc_threshold,
            max_regen: options
                .max_regen
                .unwrap_or(self.config.max_video_regen_attempts),
            num_variants: options.num_variants.unwrap_or(self.config.max_video_variants),
            seed: options.seed.unwrap_or_else(rand::random),
            aspect_ratio: self.config.aspect_ratio.clone(),
        };
        info!("Generating videos with seed {}", video_options.seed);
        let results = self.video.run(&inputs, &video_options, progress).await?;

        self.store.update(
            &job.job_id,
            JobUpdate {
                video_results: Some(results.clone()),
                ..Default::default()
            },
        )?;
        Ok(results)
    }

    async fn stitch_final(&self, job: &Job) -> Result<String, PipelineError> {
        if job.video_results.as_deref().unwrap_or_default().is_empty() {
            return Err(PipelineError::precondition(
                "Videos must be generated before stitching",
            ));
        }
        let clips = self.storage.selected_clips(&job.run_id)?;
        let transitions = clips
            .iter()
            .take(clips.len().saturating_sub(1))
            .map(|clip| {
                match job.script.as_ref().and_then(|s| s.scene(clip.scene_number)) {
                    Some(scene) => Transition::parse(&scene.transition_type, scene.transition_duration),
                    None => Ok(Transition::cut()),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self.stitch.stitch(&job.run_id, &clips, &transitions).await?;
        let url = self.storage.to_url_path(&output);
        self.store.update(
            &job.job_id,
            JobUpdate {
                final_video_path: Some(url.clone()),
                ..Default::default()
            },
        )?;
        Ok(url)
    }

    async fn references(
        &self,
        run_id: &str,
        avatar_path: &str,
    ) -> Result<(ReferenceAsset, ReferenceAsset), PipelineError> {
        let avatar = self.storage.load_asset(avatar_path).await?;
        let product_path = self.storage.find_product_image(run_id)?;
        let product = self
            .storage
            .load_asset(&product_path.to_string_lossy())
            .await?;
        Ok((avatar, product))
    }

    fn storyboard_options(&self, options: &StepOptions) -> StoryboardOptions {
        StoryboardOptions {
            threshold: options.qc_threshold,
            max_regen: options.max_regen.unwrap_or(self.config.max_regen_attempts),
            include_composition: options.include_composition.unwrap_or(true),
            custom_prompts: options.custom_prompts.clone(),
            aspect_ratio: self.config.aspect_ratio.clone(),
        }
    }

    // ─── Single-stage entry points ──────────────────────────────────────────

    /// Runs one stage against the job's persisted state. Missing
    /// prerequisites fail before any work starts.
    pub async fn run_step(
        &self,
        job_id: &str,
        step: JobStep,
        options: StepOptions,
    ) -> Result<StepOutput, PipelineError> {
        let job = self
            .store
            .get(job_id)?
            .ok_or_else(|| PipelineError::NotFound(format!("Job {}", job_id)))?;
        let events = self.broadcaster.for_job(job_id);
        let progress = BroadcastProgress::new(events.clone());
        info!("Running single step {} for job {}", step, job_id);

        let output = match step {
            JobStep::Script => {
                let request = job.request.clone();
                StepOutput::Script(self.generate_script(job_id, &request).await?)
            }
            JobStep::Avatar => StepOutput::Avatars(self.generate_avatars(&job).await?),
            JobStep::AvatarSelection => {
                if job.avatar_variants.as_deref().unwrap_or_default().is_empty() {
                    return Err(PipelineError::precondition(
                        "Avatars must be generated before selection",
                    ));
                }
                let index = options.variant_index.ok_or_else(|| {
                    PipelineError::precondition("Avatar selection requires a variant index")
                })?;
                StepOutput::AvatarSelected(self.select_avatar(job_id, index).await?)
            }
            JobStep::Storyboard => {
                StepOutput::Storyboard(self.generate_storyboard(&job, &options, &progress).await?)
            }
            JobStep::Video => {
                StepOutput::Video(self.generate_videos(&job, &options, &progress).await?)
            }
            JobStep::Stitch => StepOutput::Stitched(self.stitch_final(&job).await?),
            JobStep::Review => {
                if job.final_video_path.is_none() {
                    return Err(PipelineError::precondition(
                        "Final video must exist before review",
                    ));
                }
                StepOutput::Review(self.reviews.create_review(job_id)?)
            }
        };

        events.step_completed(step, json!({ "single_step": true }));
        Ok(output)
    }

    /// Regenerates one storyboard scene and swaps it into the job.
    pub async fn regenerate_storyboard_scene(
        &self,
        job_id: &str,
        scene_number: u32,
        custom_prompt: Option<String>,
    ) -> Result<StoryboardResult, PipelineError> {
        let job = self.store.require(job_id)?;
        let (script, avatar_path) = match (&job.script, &job.selected_avatar) {
            (Some(script), Some(avatar)) => (script, avatar),
            _ => {
                return Err(PipelineError::precondition(
                    "Script and avatar selection required before storyboard",
                ))
            }
        };
        let (avatar, product) = self.references(&job.run_id, avatar_path).await?;
        let inputs = StoryboardInputs {
            run_id: &job.run_id,
            script,
            avatar: &avatar,
            product: &product,
        };
        let mut options = StepOptions::default();
        if let Some(prompt) = custom_prompt {
            options.custom_prompts.insert(scene_number, prompt);
        }
        let progress = BroadcastProgress::new(self.broadcaster.for_job(job_id));
        let result = self
            .storyboard
            .regenerate_scene(&inputs, scene_number, &self.storyboard_options(&options), &progress)
            .await?;

        let replacement = result.clone();
        self.store.update_with(job_id, move |job| {
            let results = job.storyboard_results.get_or_insert_with(Vec::new);
            results.retain(|r| r.scene_number != replacement.scene_number);
            results.push(replacement);
            results.sort_by_key(|r| r.scene_number);
            Ok(())
        })?;
        Ok(result)
    }

    /// Overrides the automatic variant choice for one scene.
    pub async fn select_video_variant(
        &self,
        job_id: &str,
        scene_number: u32,
        variant_index: u32,
    ) -> Result<String, PipelineError> {
        let job = self.store.require(job_id)?;
        let result = job
            .video_results
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|r| r.scene_number == scene_number)
            .ok_or_else(|| {
                PipelineError::precondition(format!(
                    "Videos for scene {} must be generated before selecting a variant",
                    scene_number
                ))
            })?;

        let path = self
            .video
            .copy_selected(&job.run_id, scene_number, &result.variants, variant_index)
            .await?;
        let url = self.storage.to_url_path(&path);

        let selected_url = url.clone();
        self.store.update_with(job_id, move |job| {
            let result = job
                .video_results
                .as_mut()
                .and_then(|results| results.iter_mut().find(|r| r.scene_number == scene_number))
                .ok_or_else(|| JobError::InvalidRequest(format!("No video result for scene {}", scene_number)))?;
            result.selected_index = variant_index;
            result.selected_video_path = selected_url;
            Ok(())
        })?;
        info!(
            "Scene {}: variant {} selected by user for job {}",
            scene_number, variant_index, job_id
        );
        Ok(url)
    }
}

/// Structural checks before any media is generated. Unknown transition
/// types are rejected here rather than at stitch time.
pub fn validate_script(script: &VideoScript) -> Result<(), PipelineError> {
    if script.scenes.is_empty() {
        return Err(PipelineError::InvalidScript(
            "Script has no scenes".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for scene in &script.scenes {
        if !seen.insert(scene.scene_number) {
            return Err(PipelineError::InvalidScript(format!(
                "Duplicate scene number {}",
                scene.scene_number
            )));
        }
        if !(0.0..=2.0).contains(&scene.transition_duration) {
            return Err(PipelineError::InvalidScript(format!(
                "Scene {} transition duration {} is outside 0-2s",
                scene.scene_number, scene.transition_duration
            )));
        }
        scene
            .transition_type
            .parse::<TransitionKind>()
            .map_err(|e| PipelineError::InvalidScript(format!("Scene {}: {}", scene.scene_number, e)))?;
    }
    Ok(())
}

fn image_extension(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::prompts::fixtures::{profile, scene};

    fn script(scenes: Vec<crate::models::Scene>) -> VideoScript {
        VideoScript {
            video_title: "Bottle".to_string(),
            total_duration: 24,
            avatar_profile: profile(),
            scenes,
        }
    }

    #[test]
    fn test_validate_script_accepts_well_formed() {
        assert!(validate_script(&script(vec![scene(1), scene(2), scene(3)])).is_ok());
    }

    #[test]
    fn test_validate_script_rejects_structure_errors() {
        assert!(matches!(
            validate_script(&script(Vec::new())),
            Err(PipelineError::InvalidScript(_))
        ));
        assert!(matches!(
            validate_script(&script(vec![scene(1), scene(1)])),
            Err(PipelineError::InvalidScript(msg)) if msg.contains("Duplicate")
        ));

        let mut long = scene(2);
        long.transition_duration = 2.5;
        assert!(validate_script(&script(vec![scene(1), long])).is_err());

        let mut unknown = scene(2);
        unknown.transition_type = "spin".to_string();
        assert!(matches!(
            validate_script(&script(vec![scene(1), unknown])),
            Err(PipelineError::InvalidScript(msg)) if msg.contains("spin")
        ));
    }

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension("image/jpeg"), "jpg");
        assert_eq!(image_extension("image/webp"), "webp");
        assert_eq!(image_extension("image/png"), "png");
        assert_eq!(image_extension("application/octet-stream"), "png");
    }
}
