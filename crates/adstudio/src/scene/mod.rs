//! Per-scene generation stages built on the shared regeneration loop.

pub mod prompts;
pub mod regen;
pub mod storyboard;
pub mod video;

pub use regen::{run_regen_loop, CandidateRound, RegenOutcome};
pub use storyboard::{StoryboardInputs, StoryboardOptions, StoryboardStage};
pub use video::{VideoInputs, VideoOptions, VideoStage};
