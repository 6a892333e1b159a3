//! Scripted stand-ins for the external collaborators.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use adstudio::media::{MediaError, MediaTool};
use adstudio::models::{AvatarProfile, Scene, ScriptRequest, VideoScript};
use adstudio::providers::{
    GeneratedScript, ImageGenerator, ImageRequest, PromptRewriter, ProviderResult,
    QcJudge, ReferenceAsset, ScriptGenerator, VideoGenerator, VideoRequest,
};

/// Marker the rewriter appends; the strict judge only passes prompts
/// carrying it.
pub const REVISED: &str = "[revised]";

/// Ordered record of calls across fakes, for ordering assertions.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, needle: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.contains(needle))
    }
}

pub fn scene(scene_number: u32, transition_type: &str) -> Scene {
    Scene {
        scene_number,
        duration_seconds: 8,
        scene_type: "feature".to_string(),
        shot_type: "medium shot".to_string(),
        camera_movement: "slow dolly".to_string(),
        lighting: "soft key light".to_string(),
        visual_background: "a bright studio".to_string(),
        avatar_action: format!("presents the bottle in scene {}", scene_number),
        avatar_emotion: "confidence".to_string(),
        product_visual_integration: "Bottle in the right hand".to_string(),
        script_dialogue: "Stay cold for 24 hours.".to_string(),
        transition_to_next: transition_type.to_string(),
        sound_design: "Light beat".to_string(),
        transition_type: transition_type.to_string(),
        transition_duration: 0.5,
        audio_continuity: String::new(),
    }
}

pub fn request(scene_count: u32) -> ScriptRequest {
    let mut request = ScriptRequest::new("ThermoFlask", "Keeps drinks cold for 24h", "/img.png");
    request.scene_count = scene_count;
    request
}

// ─── Script ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeScripts {
    pub transitions: Mutex<Vec<String>>,
    pub calls: AtomicU32,
}

impl FakeScripts {
    /// Transition type per scene; scenes beyond the list cut.
    pub fn set_transitions(&self, transitions: &[&str]) {
        *self.transitions.lock().unwrap() = transitions.iter().map(|t| t.to_string()).collect();
    }
}

#[async_trait]
impl ScriptGenerator for FakeScripts {
    async fn generate_script(&self, request: &ScriptRequest) -> ProviderResult<GeneratedScript> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let transitions = self.transitions.lock().unwrap().clone();
        let scenes = (1..=request.scene_count)
            .map(|n| {
                let kind = transitions
                    .get(n as usize - 1)
                    .map(String::as_str)
                    .unwrap_or("cut");
                scene(n, kind)
            })
            .collect();
        Ok(GeneratedScript {
            script: VideoScript {
                video_title: format!("{} launch", request.product_name),
                total_duration: request.scene_count * 8,
                avatar_profile: AvatarProfile {
                    gender: "male".to_string(),
                    age_range: "30-40".to_string(),
                    attire: "a denim jacket".to_string(),
                    tone_of_voice: "upbeat".to_string(),
                    visual_description: "Curly hair and a short beard".to_string(),
                },
                scenes,
            },
            product_image: b"product-image".to_vec(),
            product_mime: "image/png".to_string(),
        })
    }
}

// ─── Images ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeImages {
    pub avatar_calls: AtomicU32,
    pub storyboard_calls: AtomicU32,
}

#[async_trait]
impl ImageGenerator for FakeImages {
    async fn generate_avatars(&self, _prompt: &str, count: u32) -> ProviderResult<Vec<Vec<u8>>> {
        self.avatar_calls.fetch_add(1, Ordering::SeqCst);
        Ok((0..count).map(|i| format!("avatar-{}", i).into_bytes()).collect())
    }

    /// The image is the prompt itself so the judge can inspect it.
    async fn generate_storyboard(&self, request: &ImageRequest) -> ProviderResult<Vec<u8>> {
        self.storyboard_calls.fetch_add(1, Ordering::SeqCst);
        Ok(request.prompt.clone().into_bytes())
    }
}

// ─── Videos ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct VideoCall {
    pub scene_number: u32,
    pub reference_count: usize,
    pub has_first_frame: bool,
    pub seed: u32,
    pub num_variants: u32,
}

pub struct FakeVideos {
    log: CallLog,
    pub calls: Mutex<Vec<VideoCall>>,
}

impl FakeVideos {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<VideoCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoGenerator for FakeVideos {
    async fn generate_videos(&self, request: &VideoRequest) -> ProviderResult<Vec<Vec<u8>>> {
        let scene_number = request
            .prompt
            .split("in scene ")
            .nth(1)
            .and_then(|rest| rest.split(|c: char| !c.is_ascii_digit()).next())
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        self.log.push(format!("video:scene_{}", scene_number));
        self.calls.lock().unwrap().push(VideoCall {
            scene_number,
            reference_count: request.references.len(),
            has_first_frame: request.first_frame.is_some(),
            seed: request.seed,
            num_variants: request.num_variants,
        });
        Ok((0..request.num_variants)
            .map(|i| format!("clip-{}-{}", scene_number, i).into_bytes())
            .collect())
    }
}

// ─── Judge & rewriter ───────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeJudge {
    /// Storyboards fail until their prompt was rewritten.
    pub strict_storyboards: AtomicBool,
    /// Score given to every video dimension.
    pub video_score: AtomicU32,
    pub storyboard_calls: AtomicU32,
    pub video_calls: AtomicU32,
}

impl FakeJudge {
    pub fn new() -> Self {
        let judge = Self::default();
        judge.video_score.store(8, Ordering::SeqCst);
        judge
    }
}

#[async_trait]
impl QcJudge for FakeJudge {
    async fn judge_storyboard(
        &self,
        _avatar: &ReferenceAsset,
        _product: &ReferenceAsset,
        candidate: &ReferenceAsset,
    ) -> ProviderResult<Value> {
        self.storyboard_calls.fetch_add(1, Ordering::SeqCst);
        let prompt = String::from_utf8_lossy(&candidate.bytes);
        let (avatar, product) =
            if self.strict_storyboards.load(Ordering::SeqCst) && !prompt.contains(REVISED) {
                (40, 45)
            } else {
                (80, 85)
            };
        Ok(json!({
            "avatar_validation": {"score": avatar, "reason": "face match"},
            "product_validation": {"score": product, "reason": "label legible"},
            "composition_quality": {"score": 90, "reason": "balanced"}
        }))
    }

    async fn judge_video(
        &self,
        _candidate: &ReferenceAsset,
        _avatar: &ReferenceAsset,
        _product: &ReferenceAsset,
    ) -> ProviderResult<Value> {
        self.video_calls.fetch_add(1, Ordering::SeqCst);
        let score = self.video_score.load(Ordering::SeqCst);
        let mut verdict = json!({ "overall_verdict": "usable" });
        for key in [
            "technical_distortion",
            "cinematic_imperfections",
            "avatar_consistency",
            "product_consistency",
            "temporal_coherence",
            "hand_body_integrity",
            "brand_text_accuracy",
        ] {
            verdict[key] = json!({"score": score, "reasoning": "steady"});
        }
        Ok(verdict)
    }
}

#[derive(Default)]
pub struct FakeRewriter {
    pub calls: AtomicU32,
}

#[async_trait]
impl PromptRewriter for FakeRewriter {
    async fn rewrite(&self, prompt: &str, _feedback: &str) -> ProviderResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{} {}", prompt, REVISED))
    }
}

// ─── Media tool ─────────────────────────────────────────────────────────────

/// Writes a placeholder at every command's output path and records the
/// command line.
pub struct FakeMediaTool {
    log: CallLog,
    pub commands: Mutex<Vec<Vec<String>>>,
    /// Concat manifests as they were on disk when used.
    pub manifests: Mutex<Vec<String>>,
    pub fail_filter_graphs: AtomicBool,
    pub duration: f64,
}

impl FakeMediaTool {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            commands: Mutex::new(Vec::new()),
            manifests: Mutex::new(Vec::new()),
            fail_filter_graphs: AtomicBool::new(false),
            duration: 8.0,
        }
    }

    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }

    pub fn commands_with(&self, arg: &str) -> Vec<Vec<String>> {
        self.commands()
            .into_iter()
            .filter(|cmd| cmd.iter().any(|a| a.contains(arg)))
            .collect()
    }
}

#[async_trait]
impl MediaTool for FakeMediaTool {
    async fn run_ffmpeg(&self, args: &[String]) -> Result<(), MediaError> {
        self.commands.lock().unwrap().push(args.to_vec());
        let output = args.last().cloned().unwrap_or_default();
        self.log.push(format!("ffmpeg:{}", output));

        if args.iter().any(|a| a == "-filter_complex")
            && self.fail_filter_graphs.load(Ordering::SeqCst)
        {
            return Err(MediaError::Failed {
                tool: "ffmpeg",
                status: 1,
                stderr: "Error initializing complex filters".to_string(),
            });
        }

        if args.iter().any(|a| a == "concat") {
            if let Some(manifest) = args.iter().position(|a| a == "-i").map(|i| &args[i + 1]) {
                let content = std::fs::read_to_string(manifest).unwrap_or_default();
                self.manifests.lock().unwrap().push(content);
            }
        }

        let path = Path::new(&output);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"encoded").unwrap();
        Ok(())
    }

    async fn probe_duration(&self, _path: &Path) -> Result<f64, MediaError> {
        Ok(self.duration)
    }

    async fn is_available(&self) -> bool {
        true
    }
}
