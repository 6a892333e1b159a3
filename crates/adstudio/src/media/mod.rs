//! Media transforms: the ffmpeg subprocess boundary, transition mapping and
//! final-cut stitching.

use std::path::PathBuf;

use thiserror::Error;

use crate::error::StorageError;

pub mod frame;
pub mod stitch;
pub mod tool;
pub mod transition;

pub use frame::extract_last_frame;
pub use stitch::{StitchPlan, StitchService};
pub use tool::{FfmpegCli, MediaTool};
pub use transition::{Transition, TransitionKind};

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to launch {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with status {status}: {stderr}")]
    Failed {
        tool: &'static str,
        status: i32,
        stderr: String,
    },

    #[error("Could not read duration of '{path}': {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("ffmpeg is not installed or not found on PATH")]
    Unavailable,

    #[error("No clips to stitch")]
    EmptyInput,

    #[error("Clip not found: {0}")]
    MissingClip(PathBuf),

    #[error("Unknown transition type '{0}'")]
    UnknownTransition(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
