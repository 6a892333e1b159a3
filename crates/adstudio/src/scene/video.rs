//! Video stage: variants per scene, strictly in scene order.
//!
//! Each scene's selected clip contributes its last frame as a continuity
//! reference for the next scene, so scenes cannot overlap.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{info, warn};

use super::prompts;
use super::regen::{run_regen_loop, CandidateRound};
use crate::media::{extract_last_frame, MediaTool};
use crate::models::{
    AvatarProfile, QcRewrite, Scene, StoryboardResult, VideoResult, VideoScript, VideoVariant,
};
use crate::pipeline::progress::{SceneEvent, SceneProgress, SceneStage};
use crate::pipeline::PipelineError;
use crate::providers::{
    ExternalCallError, ReferenceAsset, RetryPolicy, VideoGenerator, VideoRequest,
};
use crate::qc::{weighted_score, QcService};
use crate::storage::RunStorage;

pub const MAX_REFERENCE_ASSETS: usize = 3;
pub const SELECTED_VIDEO_FILE: &str = "selected_video.mp4";
const LAST_FRAME_FILE: &str = "last_frame.png";

#[derive(Debug, Clone)]
pub struct VideoOptions {
    pub threshold: Option<u32>,
    pub max_regen: u32,
    pub num_variants: u32,
    /// Shared by every scene of the run.
    pub seed: u32,
    pub aspect_ratio: String,
}

pub struct VideoInputs<'a> {
    pub run_id: &'a str,
    pub script: &'a VideoScript,
    pub storyboards: &'a [StoryboardResult],
    pub avatar: &'a ReferenceAsset,
    pub product: &'a ReferenceAsset,
}

pub struct VideoStage {
    videos: Arc<dyn VideoGenerator>,
    qc: Arc<QcService>,
    media: Arc<dyn MediaTool>,
    storage: RunStorage,
    retry: RetryPolicy,
}

impl VideoStage {
    pub fn new(
        videos: Arc<dyn VideoGenerator>,
        qc: Arc<QcService>,
        media: Arc<dyn MediaTool>,
        storage: RunStorage,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            videos,
            qc,
            media,
            storage,
            retry,
        }
    }

    pub async fn run(
        &self,
        inputs: &VideoInputs<'_>,
        options: &VideoOptions,
        progress: &dyn SceneProgress,
    ) -> Result<Vec<VideoResult>, PipelineError> {
        let mut storyboards: Vec<&StoryboardResult> = inputs.storyboards.iter().collect();
        storyboards.sort_by_key(|s| s.scene_number);
        let total = storyboards.len();

        let mut results = Vec::with_capacity(total);
        let mut continuity: Option<ReferenceAsset> = None;
        for (i, storyboard) in storyboards.into_iter().enumerate() {
            let scene = inputs.script.scene(storyboard.scene_number).ok_or_else(|| {
                PipelineError::InvalidScript(format!(
                    "No script scene for storyboard {}",
                    storyboard.scene_number
                ))
            })?;

            let result = self
                .process_scene(inputs, scene, storyboard, continuity.take(), options, progress)
                .await?;
            continuity = self.continuity_frame(inputs.run_id, &result).await;

            progress.report(SceneEvent::SceneCompleted {
                scene_number: scene.scene_number,
                stage: SceneStage::Video,
                completed: i + 1,
                total,
            });
            results.push(result);
        }
        Ok(results)
    }

    async fn process_scene(
        &self,
        inputs: &VideoInputs<'_>,
        scene: &Scene,
        storyboard: &StoryboardResult,
        continuity: Option<ReferenceAsset>,
        options: &VideoOptions,
        progress: &dyn SceneProgress,
    ) -> Result<VideoResult, PipelineError> {
        let scene_number = scene.scene_number;
        let first_frame = self.storage.load_asset(&storyboard.image_path).await?;

        let mut references = vec![inputs.avatar.clone(), inputs.product.clone()];
        references.extend(continuity);
        references.truncate(MAX_REFERENCE_ASSETS);

        let round = VideoRound {
            stage: self,
            run_id: inputs.run_id,
            scene,
            first_frame,
            references,
            avatar: inputs.avatar,
            product: inputs.product,
            options,
            rewrites: Mutex::new(Vec::new()),
        };
        let on_regen = |attempt: u32| {
            progress.report(SceneEvent::RegenAttempt {
                scene_number,
                stage: SceneStage::Video,
                attempt,
            })
        };
        let prompt = prompts::video_prompt(scene, &inputs.script.avatar_profile);
        let outcome = run_regen_loop(&round, prompt, options.max_regen, &on_regen).await?;
        let qc_rewrites = round
            .rewrites
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let best = outcome.best;
        progress.report(SceneEvent::QcResult {
            scene_number,
            stage: SceneStage::Video,
            passed: outcome.passed,
            score: best.score(),
        });
        if !outcome.passed {
            warn!(
                "Scene {} video kept below threshold after {} regeneration(s)",
                scene_number, outcome.regen_attempts
            );
        }

        let selected_path = self
            .copy_selected(inputs.run_id, scene_number, &best.variants, best.selected)
            .await?;
        info!(
            "Scene {}: selected video variant {} of {}",
            scene_number,
            best.selected,
            best.variants.len()
        );

        Ok(VideoResult {
            scene_number,
            variants: best.variants,
            selected_index: best.selected,
            selected_video_path: self.storage.to_url_path(&selected_path),
            regen_attempts: outcome.regen_attempts,
            prompt_used: outcome.prompt_used,
            qc_rewrites,
        })
    }

    /// Copies variant `index` to the scene's `selected_video.mp4`.
    pub async fn copy_selected(
        &self,
        run_id: &str,
        scene_number: u32,
        variants: &[VideoVariant],
        index: u32,
    ) -> Result<PathBuf, PipelineError> {
        let variant = variants
            .iter()
            .find(|v| v.index == index)
            .ok_or_else(|| {
                PipelineError::NotFound(format!(
                    "Variant {} for scene {}",
                    index, scene_number
                ))
            })?;
        let source = self.storage.resolve(&variant.video_path);
        Ok(self
            .storage
            .copy_into(
                &source,
                run_id,
                &RunStorage::scene_dir(scene_number),
                SELECTED_VIDEO_FILE,
            )
            .await?)
    }

    /// Last frame of the selected clip. A failed extraction only costs
    /// continuity for the next scene.
    async fn continuity_frame(&self, run_id: &str, result: &VideoResult) -> Option<ReferenceAsset> {
        let clip = self.storage.resolve(&result.selected_video_path);
        let frame = self.storage.path(
            run_id,
            &RunStorage::scene_dir(result.scene_number),
            LAST_FRAME_FILE,
        );
        if let Err(e) = extract_last_frame(self.media.as_ref(), &clip, &frame).await {
            warn!(
                "Last frame extraction failed for scene {}: {}",
                result.scene_number, e
            );
            return None;
        }
        match self.storage.read(&frame).await {
            Ok(bytes) => Some(ReferenceAsset::new(bytes, "image/png")),
            Err(e) => {
                warn!("Could not read last frame of scene {}: {}", result.scene_number, e);
                None
            }
        }
    }
}

struct VideoCandidate {
    variants: Vec<VideoVariant>,
    selected: u32,
}

impl VideoCandidate {
    fn selected_variant(&self) -> Option<&VideoVariant> {
        self.variants.iter().find(|v| v.index == self.selected)
    }

    fn score(&self) -> u32 {
        self.selected_variant()
            .and_then(|v| v.qc_report.as_ref())
            .map(weighted_score)
            .unwrap_or(0)
    }
}

struct VideoRound<'a> {
    stage: &'a VideoStage,
    run_id: &'a str,
    scene: &'a Scene,
    first_frame: ReferenceAsset,
    references: Vec<ReferenceAsset>,
    avatar: &'a ReferenceAsset,
    product: &'a ReferenceAsset,
    options: &'a VideoOptions,
    rewrites: Mutex<Vec<QcRewrite>>,
}

#[async_trait]
impl CandidateRound for VideoRound<'_> {
    type Candidate = VideoCandidate;

    async fn generate(&self, prompt: &str, attempt: u32) -> Result<VideoCandidate, PipelineError> {
        let request = VideoRequest {
            prompt: prompt.to_string(),
            first_frame: Some(self.first_frame.clone()),
            references: self.references.clone(),
            num_variants: self.options.num_variants,
            seed: self.options.seed,
            aspect_ratio: self.options.aspect_ratio.clone(),
            duration_seconds: self.scene.duration_seconds,
        };
        let request = &request;
        let videos = &self.stage.videos;
        let clips = self
            .stage
            .retry
            .run("generate_videos", move || videos.generate_videos(request))
            .await?;
        if clips.is_empty() {
            return Err(ExternalCallError::Other(format!(
                "Video generator returned no clips for scene {}",
                self.scene.scene_number
            ))
            .into());
        }

        let subdir = format!(
            "{}/video_variants/attempt_{}",
            RunStorage::scene_dir(self.scene.scene_number),
            attempt
        );
        let mut variants = Vec::with_capacity(clips.len());
        for (i, clip) in clips.into_iter().enumerate() {
            let index = i as u32;
            let path = self
                .stage
                .storage
                .save_bytes(self.run_id, &subdir, &format!("variant_{}.mp4", index), &clip)
                .await?;

            let candidate = ReferenceAsset::new(clip, "video/mp4");
            let qc_report = match self
                .stage
                .qc
                .qc_video(&candidate, self.avatar, self.product)
                .await
            {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(
                        "Video QC failed for scene {} variant {}: {}",
                        self.scene.scene_number, index, e
                    );
                    None
                }
            };
            variants.push(VideoVariant {
                index,
                video_path: self.stage.storage.to_url_path(&path),
                qc_report,
            });
        }

        let selected = self
            .stage
            .qc
            .select_best_video_variant(&variants)
            .unwrap_or(variants[0].index);
        Ok(VideoCandidate { variants, selected })
    }

    fn passes(&self, candidate: &VideoCandidate) -> bool {
        candidate
            .selected_variant()
            .and_then(|v| v.qc_report.as_ref())
            .is_some_and(|report| self.stage.qc.video_passes(report, self.options.threshold))
    }

    fn better(&self, candidate: &VideoCandidate, best: &VideoCandidate) -> bool {
        candidate.score() > best.score()
    }

    async fn rewrite(
        &self,
        prompt: &str,
        latest: &VideoCandidate,
        attempt: u32,
    ) -> Result<String, PipelineError> {
        let Some(report) = latest.selected_variant().and_then(|v| v.qc_report.as_ref()) else {
            return Ok(prompt.to_string());
        };
        let (feedback, rewritten) = self.stage.qc.rewrite_video_prompt(prompt, report).await?;
        self.rewrites
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(QcRewrite {
                attempt,
                feedback,
                rewritten_prompt: rewritten.clone(),
            });
        Ok(rewritten)
    }
}
