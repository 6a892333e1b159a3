use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Settings, StitchConfig};

/// Pipeline knobs resolved from settings once at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub storyboard_qc_threshold: u32,
    pub video_qc_threshold: u32,
    pub max_regen_attempts: u32,
    pub max_video_regen_attempts: u32,
    pub max_video_variants: u32,
    pub max_avatar_variants: u32,
    pub max_concurrent_scenes: usize,
    pub aspect_ratio: String,
    pub avatar_poll_interval: Duration,
    pub avatar_timeout: Duration,
    pub stitch: StitchConfig,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            output_dir: settings.output_dir(),
            storyboard_qc_threshold: settings.storyboard_qc_threshold,
            video_qc_threshold: settings.video_qc_threshold,
            max_regen_attempts: settings.max_regen_attempts,
            max_video_regen_attempts: settings.max_video_regen_attempts,
            max_video_variants: settings.max_video_variants,
            max_avatar_variants: settings.max_avatar_variants,
            max_concurrent_scenes: settings.max_concurrent_scenes.max(1),
            aspect_ratio: settings.aspect_ratio.clone(),
            avatar_poll_interval: settings.avatar_selection.poll_interval(),
            avatar_timeout: settings.avatar_selection.timeout(),
            stitch: settings.stitch.clone(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}
