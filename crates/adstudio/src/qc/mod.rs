//! Quality control: judge verdict parsing, pass/fail policy, variant
//! ranking and feedback assembly for prompt rewriting.

pub mod policy;
pub mod service;

pub use policy::{
    select_best_video_variant, storyboard_feedback, storyboard_passes, video_feedback,
    video_passes, weighted_score,
};
pub use service::{QcError, QcService};
