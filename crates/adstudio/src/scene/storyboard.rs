//! Storyboard stage: one still per scene, scenes processed concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::prompts;
use super::regen::{run_regen_loop, CandidateRound};
use crate::models::{Scene, StoryboardQcReport, StoryboardResult, VideoScript};
use crate::pipeline::progress::{SceneEvent, SceneProgress, SceneStage};
use crate::pipeline::PipelineError;
use crate::providers::{ImageGenerator, ImageRequest, ReferenceAsset, RetryPolicy};
use crate::qc::QcService;
use crate::storage::RunStorage;

const STORYBOARD_FILE: &str = "storyboard.png";

#[derive(Debug, Clone)]
pub struct StoryboardOptions {
    /// Overrides the configured storyboard threshold.
    pub threshold: Option<u32>,
    pub max_regen: u32,
    pub include_composition: bool,
    /// Replaces the built prompt for the given scene numbers.
    pub custom_prompts: HashMap<u32, String>,
    pub aspect_ratio: String,
}

impl StoryboardOptions {
    pub fn new(max_regen: u32, aspect_ratio: &str) -> Self {
        Self {
            threshold: None,
            max_regen,
            include_composition: true,
            custom_prompts: HashMap::new(),
            aspect_ratio: aspect_ratio.to_string(),
        }
    }
}

/// Fixed references every storyboard is judged against.
pub struct StoryboardInputs<'a> {
    pub run_id: &'a str,
    pub script: &'a VideoScript,
    pub avatar: &'a ReferenceAsset,
    pub product: &'a ReferenceAsset,
}

pub struct StoryboardStage {
    images: Arc<dyn ImageGenerator>,
    qc: Arc<QcService>,
    storage: RunStorage,
    retry: RetryPolicy,
    max_concurrent_scenes: usize,
}

impl StoryboardStage {
    pub fn new(
        images: Arc<dyn ImageGenerator>,
        qc: Arc<QcService>,
        storage: RunStorage,
        retry: RetryPolicy,
        max_concurrent_scenes: usize,
    ) -> Self {
        Self {
            images,
            qc,
            storage,
            retry,
            max_concurrent_scenes: max_concurrent_scenes.max(1),
        }
    }

    /// Generates every scene's storyboard. Results are ordered by scene
    /// number whatever order the scenes finish in.
    pub async fn run(
        &self,
        inputs: &StoryboardInputs<'_>,
        options: &StoryboardOptions,
        progress: &dyn SceneProgress,
    ) -> Result<Vec<StoryboardResult>, PipelineError> {
        let semaphore = Semaphore::new(self.max_concurrent_scenes);
        let completed = AtomicUsize::new(0);
        let total = inputs.script.scenes.len();

        let tasks = inputs.script.scenes.iter().enumerate().map(|(i, scene)| {
            let semaphore = &semaphore;
            let completed = &completed;
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| PipelineError::Cancelled)?;
                let result = self
                    .process_scene(inputs, scene, i + 1, options, progress)
                    .await?;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress.report(SceneEvent::SceneCompleted {
                    scene_number: scene.scene_number,
                    stage: SceneStage::Storyboard,
                    completed: done,
                    total,
                });
                Ok::<_, PipelineError>(result)
            }
        });

        let mut results = try_join_all(tasks).await?;
        results.sort_by_key(|r| r.scene_number);
        Ok(results)
    }

    /// Re-runs one scene, optionally with a hand-written prompt.
    pub async fn regenerate_scene(
        &self,
        inputs: &StoryboardInputs<'_>,
        scene_number: u32,
        options: &StoryboardOptions,
        progress: &dyn SceneProgress,
    ) -> Result<StoryboardResult, PipelineError> {
        let (position, scene) = inputs
            .script
            .scenes
            .iter()
            .enumerate()
            .find(|(_, s)| s.scene_number == scene_number)
            .ok_or_else(|| PipelineError::NotFound(format!("Scene {}", scene_number)))?;
        self.process_scene(inputs, scene, position + 1, options, progress)
            .await
    }

    async fn process_scene(
        &self,
        inputs: &StoryboardInputs<'_>,
        scene: &Scene,
        position: usize,
        options: &StoryboardOptions,
        progress: &dyn SceneProgress,
    ) -> Result<StoryboardResult, PipelineError> {
        let scene_number = scene.scene_number;
        let prompt = options
            .custom_prompts
            .get(&scene_number)
            .cloned()
            .unwrap_or_else(|| {
                prompts::storyboard_prompt(
                    scene,
                    position,
                    inputs.script.scenes.len(),
                    &options.aspect_ratio,
                )
            });

        let round = StoryboardRound {
            stage: self,
            inputs,
            options,
        };
        let on_regen = |attempt: u32| {
            progress.report(SceneEvent::RegenAttempt {
                scene_number,
                stage: SceneStage::Storyboard,
                attempt,
            })
        };
        let outcome = run_regen_loop(&round, prompt, options.max_regen, &on_regen).await?;

        let report = outcome.best.report;
        progress.report(SceneEvent::QcResult {
            scene_number,
            stage: SceneStage::Storyboard,
            passed: outcome.passed,
            score: report.combined_score(),
        });
        if outcome.passed {
            info!(
                "Scene {} storyboard passed QC after {} regeneration(s)",
                scene_number, outcome.regen_attempts
            );
        } else {
            warn!(
                "Scene {} storyboard kept below threshold (avatar={}, product={}) after {} regeneration(s)",
                scene_number,
                report.avatar_validation.score,
                report.product_validation.score,
                outcome.regen_attempts
            );
        }

        let path = self
            .storage
            .save_bytes(
                inputs.run_id,
                &RunStorage::scene_dir(scene_number),
                STORYBOARD_FILE,
                &outcome.best.image,
            )
            .await?;

        Ok(StoryboardResult {
            scene_number,
            image_path: self.storage.to_url_path(&path),
            qc_report: report,
            regen_attempts: outcome.regen_attempts,
            prompt_used: outcome.prompt_used,
        })
    }
}

struct StoryboardCandidate {
    image: Vec<u8>,
    report: StoryboardQcReport,
}

struct StoryboardRound<'a> {
    stage: &'a StoryboardStage,
    inputs: &'a StoryboardInputs<'a>,
    options: &'a StoryboardOptions,
}

#[async_trait]
impl CandidateRound for StoryboardRound<'_> {
    type Candidate = StoryboardCandidate;

    async fn generate(&self, prompt: &str, _attempt: u32) -> Result<StoryboardCandidate, PipelineError> {
        let request = ImageRequest {
            prompt: prompt.to_string(),
            references: vec![self.inputs.avatar.clone(), self.inputs.product.clone()],
            aspect_ratio: self.options.aspect_ratio.clone(),
        };
        let request = &request;
        let images = &self.stage.images;
        let image = self
            .stage
            .retry
            .run("generate_storyboard", move || images.generate_storyboard(request))
            .await?;

        let candidate = ReferenceAsset::new(image, "image/png");
        let report = self
            .stage
            .qc
            .qc_storyboard(self.inputs.avatar, self.inputs.product, &candidate)
            .await?;

        Ok(StoryboardCandidate {
            image: candidate.bytes,
            report,
        })
    }

    fn passes(&self, candidate: &StoryboardCandidate) -> bool {
        self.stage.qc.storyboard_passes(
            &candidate.report,
            self.options.threshold,
            self.options.include_composition,
        )
    }

    fn better(&self, candidate: &StoryboardCandidate, best: &StoryboardCandidate) -> bool {
        candidate.report.combined_score() > best.report.combined_score()
    }

    async fn rewrite(
        &self,
        prompt: &str,
        latest: &StoryboardCandidate,
        _attempt: u32,
    ) -> Result<String, PipelineError> {
        Ok(self.stage.qc.rewrite_prompt(prompt, &latest.report).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use serde_json::{json, Value};
    use tempfile::TempDir;

    use crate::pipeline::NoopProgress;
    use crate::providers::{PromptRewriter, ProviderResult, QcJudge};
    use crate::scene::prompts::fixtures::{profile, scene};

    /// Later scenes answer faster, so scenes finish out of order.
    #[derive(Default)]
    struct GatedImages {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        finished: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl ImageGenerator for GatedImages {
        async fn generate_avatars(&self, _prompt: &str, _count: u32) -> ProviderResult<Vec<Vec<u8>>> {
            Ok(Vec::new())
        }

        async fn generate_storyboard(&self, request: &ImageRequest) -> ProviderResult<Vec<u8>> {
            let scene_number = (1..=4u32)
                .find(|n| request.prompt.contains(&format!("scene {} of", n)))
                .unwrap_or(0);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(u64::from(5 - scene_number) * 100)).await;

            self.finished.lock().unwrap().push(scene_number);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![scene_number as u8])
        }
    }

    struct PassingJudge;

    #[async_trait]
    impl QcJudge for PassingJudge {
        async fn judge_storyboard(
            &self,
            _avatar: &ReferenceAsset,
            _product: &ReferenceAsset,
            _candidate: &ReferenceAsset,
        ) -> ProviderResult<Value> {
            Ok(json!({
                "avatar_validation": {"score": 90, "reason": "same face"},
                "product_validation": {"score": 90, "reason": "label intact"}
            }))
        }

        async fn judge_video(
            &self,
            _candidate: &ReferenceAsset,
            _avatar: &ReferenceAsset,
            _product: &ReferenceAsset,
        ) -> ProviderResult<Value> {
            Ok(json!({}))
        }
    }

    struct EchoRewriter;

    #[async_trait]
    impl PromptRewriter for EchoRewriter {
        async fn rewrite(&self, prompt: &str, _feedback: &str) -> ProviderResult<String> {
            Ok(prompt.to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_scenes_run_concurrently_up_to_limit_and_keep_order() {
        let dir = TempDir::new().unwrap();
        let images = Arc::new(GatedImages::default());
        let qc = Arc::new(QcService::new(
            Arc::new(PassingJudge),
            Arc::new(EchoRewriter),
            RetryPolicy::none(),
            70,
            7,
        ));
        let stage = StoryboardStage::new(
            images.clone(),
            qc,
            RunStorage::new(dir.path()),
            RetryPolicy::none(),
            2,
        );

        let script = VideoScript {
            video_title: "Bottle".to_string(),
            total_duration: 32,
            avatar_profile: profile(),
            scenes: (1..=4).map(scene).collect(),
        };
        let avatar = ReferenceAsset::new(vec![1], "image/png");
        let product = ReferenceAsset::new(vec![2], "image/png");
        let inputs = StoryboardInputs {
            run_id: "run1",
            script: &script,
            avatar: &avatar,
            product: &product,
        };

        let results = stage
            .run(&inputs, &StoryboardOptions::new(0, "9:16"), &NoopProgress)
            .await
            .unwrap();

        assert_eq!(images.peak.load(Ordering::SeqCst), 2);
        assert_eq!(images.in_flight.load(Ordering::SeqCst), 0);
        // Scene 2 outruns scene 1 while both hold a permit.
        let finished = images.finished.lock().unwrap().clone();
        assert_eq!(finished.len(), 4);
        assert_eq!(finished[0], 2);
        assert_ne!(finished, vec![1, 2, 3, 4]);

        let numbers: Vec<u32> = results.iter().map(|r| r.scene_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert!(results.iter().all(|r| r.regen_attempts == 0));
        assert_eq!(results[2].image_path, "/output/run1/scenes/scene_3/storyboard.png");
    }
}
