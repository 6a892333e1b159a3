use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub version: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Falls back to `~/.adstudio/data/adstudio.db` when unset.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_storyboard_qc_threshold")]
    pub storyboard_qc_threshold: u32,
    #[serde(default = "default_video_qc_threshold")]
    pub video_qc_threshold: u32,
    /// Storyboard regeneration budget per scene.
    #[serde(default = "default_max_regen_attempts")]
    pub max_regen_attempts: u32,
    #[serde(default = "default_max_video_regen_attempts")]
    pub max_video_regen_attempts: u32,
    #[serde(default = "default_variants")]
    pub max_video_variants: u32,
    #[serde(default = "default_variants")]
    pub max_avatar_variants: u32,
    #[serde(default = "default_max_concurrent_scenes")]
    pub max_concurrent_scenes: usize,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default)]
    pub avatar_selection: AvatarSelectionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub stitch: StitchConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_storyboard_qc_threshold() -> u32 {
    60
}

fn default_video_qc_threshold() -> u32 {
    6
}

fn default_max_regen_attempts() -> u32 {
    3
}

fn default_max_video_regen_attempts() -> u32 {
    2
}

fn default_variants() -> u32 {
    4
}

fn default_max_concurrent_scenes() -> usize {
    5
}

fn default_aspect_ratio() -> String {
    "9:16".to_string()
}

impl Settings {
    /// Resolved database location.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(path)),
            None => crate::db::default_database_path(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            output_dir: default_output_dir(),
            database_path: None,
            storyboard_qc_threshold: default_storyboard_qc_threshold(),
            video_qc_threshold: default_video_qc_threshold(),
            max_regen_attempts: default_max_regen_attempts(),
            max_video_regen_attempts: default_max_video_regen_attempts(),
            max_video_variants: default_variants(),
            max_avatar_variants: default_variants(),
            max_concurrent_scenes: default_max_concurrent_scenes(),
            aspect_ratio: default_aspect_ratio(),
            avatar_selection: AvatarSelectionConfig::default(),
            retry: RetryConfig::default(),
            stitch: StitchConfig::default(),
            events: EventsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Bounded wait for the human avatar choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvatarSelectionConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: f64,
    #[serde(default = "default_selection_timeout_secs")]
    pub timeout_secs: f64,
}

fn default_poll_interval_secs() -> f64 {
    1.0
}

fn default_selection_timeout_secs() -> f64 {
    600.0
}

impl AvatarSelectionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }
}

impl Default for AvatarSelectionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_selection_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: f64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_retryable_codes")]
    pub retryable_codes: Vec<u16>,
}

fn default_retries() -> u32 {
    3
}

fn default_initial_delay_secs() -> f64 {
    2.0
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_retryable_codes() -> Vec<u16> {
    vec![429, 500, 503]
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            initial_delay_secs: default_initial_delay_secs(),
            backoff_factor: default_backoff_factor(),
            retryable_codes: default_retryable_codes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StitchConfig {
    /// Above this many clips, crossfade graphs are skipped for plain concatenation.
    #[serde(default = "default_max_crossfade_clips")]
    pub max_crossfade_clips: usize,
    /// Used when ffprobe cannot report a clip duration.
    #[serde(default = "default_fallback_clip_duration_secs")]
    pub fallback_clip_duration_secs: f64,
    #[serde(default)]
    pub loudness: LoudnessConfig,
}

fn default_max_crossfade_clips() -> usize {
    5
}

fn default_fallback_clip_duration_secs() -> f64 {
    8.0
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            max_crossfade_clips: default_max_crossfade_clips(),
            fallback_clip_duration_secs: default_fallback_clip_duration_secs(),
            loudness: LoudnessConfig::default(),
        }
    }
}

/// EBU R128 targets for the final loudnorm pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoudnessConfig {
    #[serde(default = "default_integrated")]
    pub integrated: f64,
    #[serde(default = "default_true_peak")]
    pub true_peak: f64,
    #[serde(default = "default_lra")]
    pub lra: f64,
}

fn default_integrated() -> f64 {
    -14.0
}

fn default_true_peak() -> f64 {
    -1.0
}

fn default_lra() -> f64 {
    11.0
}

impl LoudnessConfig {
    pub fn filter(&self) -> String {
        format!(
            "loudnorm=I={}:TP={}:LRA={}",
            self.integrated, self.true_peak, self.lra
        )
    }
}

impl Default for LoudnessConfig {
    fn default() -> Self {
        Self {
            integrated: default_integrated(),
            true_peak: default_true_peak(),
            lra: default_lra(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

fn default_keepalive_secs() -> u64 {
    15
}

impl EventsConfig {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
