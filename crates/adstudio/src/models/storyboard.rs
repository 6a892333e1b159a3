use serde::{Deserialize, Serialize};

use super::qc::StoryboardQcReport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryboardResult {
    pub scene_number: u32,
    pub image_path: String,
    pub qc_report: StoryboardQcReport,
    #[serde(default)]
    pub regen_attempts: u32,
    #[serde(default)]
    pub prompt_used: String,
}
