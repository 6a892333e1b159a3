//! Final-cut composition.
//!
//! Every clip is first re-encoded to constant 24 fps with uniform pixel and
//! audio formats, since upstream clips may carry variable frame timing that
//! breaks frame-accurate compositing. The normalized clips are then either
//! crossfaded through one `xfade`/`acrossfade` filter graph or joined with
//! the concat demuxer, and the result gets a loudness pass.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::try_join_all;
use tracing::{info, warn};

use super::transition::Transition;
use super::{MediaError, MediaTool};
use crate::config::StitchConfig;
use crate::error::StorageError;
use crate::storage::{RunStorage, SelectedClip};

const FINAL_DIR: &str = "final";
const WORK_DIR: &str = "work";
const FINAL_NAME: &str = "commercial.mp4";
const RAW_NAME: &str = "commercial_raw.mp4";

/// How the normalized clips are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StitchPlan {
    /// Single clip, copied byte for byte.
    Copy,
    Concat,
    Crossfade,
}

/// Plain concatenation when every boundary is a cut or there are more
/// clips than a filter graph handles reliably.
pub fn plan(clip_count: usize, transitions: &[Transition], max_crossfade_clips: usize) -> StitchPlan {
    if clip_count <= 1 {
        StitchPlan::Copy
    } else if clip_count > max_crossfade_clips || transitions.iter().all(Transition::is_cut) {
        StitchPlan::Concat
    } else {
        StitchPlan::Crossfade
    }
}

/// One transition per boundary: missing entries become cuts, extras are
/// dropped.
pub fn boundary_transitions(clip_count: usize, transitions: &[Transition]) -> Vec<Transition> {
    (0..clip_count.saturating_sub(1))
        .map(|k| transitions.get(k).copied().unwrap_or_else(Transition::cut))
        .collect()
}

/// Start offset of each crossfade within the accumulated output.
pub fn crossfade_offsets(durations: &[f64], transitions: &[Transition]) -> Vec<f64> {
    let mut clip_total = 0.0;
    let mut overlap_total = 0.0;
    transitions
        .iter()
        .zip(durations)
        .map(|(transition, duration)| {
            clip_total += duration;
            overlap_total += transition.duration;
            (clip_total - overlap_total).max(0.0)
        })
        .collect()
}

/// Filter graph chaining `xfade` (video) and `acrossfade` (audio) across all
/// inputs. Returns the graph with its final video and audio labels.
pub fn crossfade_graph(durations: &[f64], transitions: &[Transition]) -> (String, String, String) {
    let mut parts = Vec::new();
    for i in 0..durations.len() {
        parts.push(format!("[{i}:v]setpts=PTS-STARTPTS[v{i}]"));
        parts.push(format!("[{i}:a]aresample=async=1[a{i}]"));
    }

    let mut video = "v0".to_string();
    let mut audio = "a0".to_string();
    let offsets = crossfade_offsets(durations, transitions);
    for (k, (transition, offset)) in transitions.iter().zip(offsets).enumerate() {
        let next = k + 1;
        let out_video = format!("xv{next}");
        let out_audio = format!("xa{next}");
        parts.push(format!(
            "[{video}][v{next}]xfade=transition={}:duration={:.3}:offset={:.3}[{out_video}]",
            transition.kind.xfade_name(),
            transition.duration,
            offset
        ));
        parts.push(format!(
            "[{audio}][a{next}]acrossfade=d={:.3}[{out_audio}]",
            transition.duration
        ));
        video = out_video;
        audio = out_audio;
    }

    (parts.join(";"), video, audio)
}

pub fn concat_manifest(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|p| format!("file '{}'\n", p.to_string_lossy().replace('\'', "'\\''")))
        .collect()
}

fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

const ENCODE_ARGS: [&str; 10] = [
    "-c:v", "libx264", "-preset", "fast", "-crf", "18", "-c:a", "aac", "-b:a", "192k",
];

pub fn normalize_args(input: &Path, output: &Path) -> Vec<String> {
    let mut cmd = args(["-y", "-i"]);
    cmd.push(path_arg(input));
    cmd.extend(args(["-vf", "fps=24,format=yuv420p"]));
    cmd.extend(args(ENCODE_ARGS));
    cmd.extend(args(["-ar", "48000", "-ac", "2", "-movflags", "+faststart"]));
    cmd.push(path_arg(output));
    cmd
}

pub struct StitchService {
    tool: Arc<dyn MediaTool>,
    storage: RunStorage,
    config: StitchConfig,
}

impl StitchService {
    pub fn new(tool: Arc<dyn MediaTool>, storage: RunStorage, config: StitchConfig) -> Self {
        Self {
            tool,
            storage,
            config,
        }
    }

    /// Composes `clips` (ordered by scene number) into
    /// `<run>/final/commercial.mp4`. `transitions[k]` joins clip k and k+1.
    pub async fn stitch(
        &self,
        run_id: &str,
        clips: &[SelectedClip],
        transitions: &[Transition],
    ) -> Result<PathBuf, MediaError> {
        if clips.is_empty() {
            return Err(MediaError::EmptyInput);
        }
        for clip in clips {
            let is_file = tokio::fs::metadata(&clip.path)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if !is_file {
                return Err(MediaError::MissingClip(clip.path.clone()));
            }
        }
        if !self.tool.is_available().await {
            return Err(MediaError::Unavailable);
        }

        let final_dir = self.storage.run_dir(run_id).join(FINAL_DIR);
        self.storage.ensure_dir(&final_dir).await?;
        let output = final_dir.join(FINAL_NAME);

        let transitions = boundary_transitions(clips.len(), transitions);
        let plan = plan(clips.len(), &transitions, self.config.max_crossfade_clips);

        if plan == StitchPlan::Copy {
            tokio::fs::copy(&clips[0].path, &output)
                .await
                .map_err(|e| StorageError::CopyFile {
                    from: clips[0].path.clone(),
                    to: output.clone(),
                    source: e,
                })?;
            info!("Single clip copied to {}", output.display());
            return Ok(output);
        }

        let work_dir = final_dir.join(WORK_DIR);
        self.storage.ensure_dir(&work_dir).await?;
        let normalized = self.normalize_all(clips, &work_dir).await?;

        let raw = final_dir.join(RAW_NAME);
        match plan {
            StitchPlan::Crossfade => {
                if let Err(e) = self.crossfade(&normalized, &transitions, &raw).await {
                    warn!("Crossfade compositing failed, falling back to concat: {}", e);
                    self.concat(&normalized, &work_dir, &raw).await?;
                }
            }
            _ => self.concat(&normalized, &work_dir, &raw).await?,
        }

        self.normalize_loudness(&raw, &output).await?;
        self.cleanup(&raw, &work_dir).await;

        info!(
            "Stitched {} clips ({:?}) into {}",
            clips.len(),
            plan,
            output.display()
        );
        Ok(output)
    }

    async fn normalize_all(
        &self,
        clips: &[SelectedClip],
        work_dir: &Path,
    ) -> Result<Vec<PathBuf>, MediaError> {
        let jobs = clips.iter().enumerate().map(|(i, clip)| {
            let target = work_dir.join(format!("norm_{}.mp4", i));
            async move {
                self.tool
                    .run_ffmpeg(&normalize_args(&clip.path, &target))
                    .await?;
                Ok::<_, MediaError>(target)
            }
        });
        let normalized = try_join_all(jobs).await?;
        info!("Normalized {} clips to 24 fps", normalized.len());
        Ok(normalized)
    }

    async fn crossfade(
        &self,
        clips: &[PathBuf],
        transitions: &[Transition],
        output: &Path,
    ) -> Result<(), MediaError> {
        let mut durations = Vec::with_capacity(clips.len());
        for clip in clips {
            let duration = match self.tool.probe_duration(clip).await {
                Ok(d) if d > 0.0 => d,
                Ok(d) => {
                    warn!("Non-positive duration {} for {}", d, clip.display());
                    self.config.fallback_clip_duration_secs
                }
                Err(e) => {
                    warn!("Duration probe failed for {}: {}", clip.display(), e);
                    self.config.fallback_clip_duration_secs
                }
            };
            durations.push(duration);
        }

        let (graph, video, audio) = crossfade_graph(&durations, transitions);
        let mut cmd = args(["-y"]);
        for clip in clips {
            cmd.push("-i".to_string());
            cmd.push(path_arg(clip));
        }
        cmd.extend(args(["-filter_complex"]));
        cmd.push(graph);
        cmd.extend(args(["-map".to_string(), format!("[{}]", video)]));
        cmd.extend(args(["-map".to_string(), format!("[{}]", audio)]));
        cmd.extend(args(ENCODE_ARGS));
        cmd.extend(args(["-movflags", "+faststart"]));
        cmd.push(path_arg(output));
        self.tool.run_ffmpeg(&cmd).await
    }

    async fn concat(
        &self,
        clips: &[PathBuf],
        work_dir: &Path,
        output: &Path,
    ) -> Result<(), MediaError> {
        let manifest = work_dir.join("concat.txt");
        tokio::fs::write(&manifest, concat_manifest(clips))
            .await
            .map_err(|e| StorageError::WriteFile {
                path: manifest.clone(),
                source: e,
            })?;

        let mut cmd = args(["-y", "-f", "concat", "-safe", "0", "-i"]);
        cmd.push(path_arg(&manifest));
        cmd.extend(args(ENCODE_ARGS));
        cmd.extend(args(["-movflags", "+faststart"]));
        cmd.push(path_arg(output));
        self.tool.run_ffmpeg(&cmd).await
    }

    async fn normalize_loudness(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        let mut cmd = args(["-y", "-i"]);
        cmd.push(path_arg(input));
        cmd.push("-af".to_string());
        cmd.push(self.config.loudness.filter());
        cmd.extend(args(["-c:v", "copy", "-c:a", "aac", "-b:a", "192k"]));
        cmd.push(path_arg(output));
        self.tool.run_ffmpeg(&cmd).await
    }

    async fn cleanup(&self, raw: &Path, work_dir: &Path) {
        if let Err(e) = tokio::fs::remove_file(raw).await {
            warn!("Could not remove {}: {}", raw.display(), e);
        }
        if let Err(e) = tokio::fs::remove_dir_all(work_dir).await {
            warn!("Could not remove {}: {}", work_dir.display(), e);
        }
    }
}
