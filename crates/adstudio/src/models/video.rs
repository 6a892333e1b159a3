use serde::{Deserialize, Serialize};

use super::qc::VideoQcReport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoVariant {
    pub index: u32,
    pub video_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qc_report: Option<VideoQcReport>,
}

/// One prompt rewrite driven by QC feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcRewrite {
    pub attempt: u32,
    pub feedback: String,
    pub rewritten_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoResult {
    pub scene_number: u32,
    pub variants: Vec<VideoVariant>,
    pub selected_index: u32,
    pub selected_video_path: String,
    #[serde(default)]
    pub regen_attempts: u32,
    #[serde(default)]
    pub prompt_used: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qc_rewrites: Vec<QcRewrite>,
}

impl VideoResult {
    pub fn variant(&self, index: u32) -> Option<&VideoVariant> {
        self.variants.iter().find(|v| v.index == index)
    }
}
