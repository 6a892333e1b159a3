//! ffmpeg/ffprobe subprocess boundary.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::MediaError;

/// Bytes of stderr kept in error messages.
const STDERR_TAIL_BYTES: usize = 500;

/// Media transform subprocess. Failures carry the tool's diagnostic output.
#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Runs ffmpeg with `args` (without the program name).
    async fn run_ffmpeg(&self, args: &[String]) -> Result<(), MediaError>;

    /// Container duration in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError>;

    async fn is_available(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct FfmpegCli {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegCli {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl FfmpegCli {
    pub fn new<P: AsRef<Path>>(ffmpeg: P, ffprobe: P) -> Self {
        Self {
            ffmpeg: ffmpeg.as_ref().to_path_buf(),
            ffprobe: ffprobe.as_ref().to_path_buf(),
        }
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

#[async_trait]
impl MediaTool for FfmpegCli {
    async fn run_ffmpeg(&self, args: &[String]) -> Result<(), MediaError> {
        tracing::debug!("ffmpeg {}", args.join(" "));
        let output = Command::new(&self.ffmpeg)
            .kill_on_drop(true)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| MediaError::Spawn {
                tool: "ffmpeg",
                source: e,
            })?;

        if !output.status.success() {
            return Err(MediaError::Failed {
                tool: "ffmpeg",
                status: output.status.code().unwrap_or(-1),
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        let output = Command::new(&self.ffprobe)
            .kill_on_drop(true)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| MediaError::Spawn {
                tool: "ffprobe",
                source: e,
            })?;

        if !output.status.success() {
            return Err(MediaError::Failed {
                tool: "ffprobe",
                status: output.status.code().unwrap_or(-1),
                stderr: stderr_tail(&output.stderr),
            });
        }

        let probe: ProbeOutput =
            serde_json::from_slice(&output.stdout).map_err(|e| MediaError::Probe {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .ok_or_else(|| MediaError::Probe {
                path: path.to_path_buf(),
                reason: "no format duration".to_string(),
            })
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .kill_on_drop(true)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}
