//! Quality-control reports.
//!
//! Reports are persisted inside job rows, so their shape evolves over time.
//! Each report carries a `version`; rows written before versioning decode as
//! version 1. Video dimensions are all optional: a dimension the judge did
//! not score (or that an older report predates) is skipped by the pass check
//! and contributes nothing to variant ranking.

use serde::{Deserialize, Serialize};

/// Version written by this build.
pub const QC_REPORT_VERSION: u32 = 2;

fn legacy_version() -> u32 {
    1
}

/// A 0-100 score with the judge's justification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcScore {
    pub score: u32,
    pub reason: String,
}

impl QcScore {
    pub fn new(score: u32, reason: &str) -> Self {
        Self {
            score,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryboardQcReport {
    #[serde(default = "legacy_version")]
    pub version: u32,
    pub avatar_validation: QcScore,
    pub product_validation: QcScore,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composition_quality: Option<QcScore>,
}

impl StoryboardQcReport {
    pub fn new(avatar: QcScore, product: QcScore, composition: Option<QcScore>) -> Self {
        Self {
            version: QC_REPORT_VERSION,
            avatar_validation: avatar,
            product_validation: product,
            composition_quality: composition,
        }
    }

    /// Avatar plus product score, used to rank storyboard candidates.
    pub fn combined_score(&self) -> u32 {
        self.avatar_validation.score + self.product_validation.score
    }
}

/// A 0-10 score with the judge's reasoning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoQcDimension {
    pub score: u32,
    pub reasoning: String,
}

impl VideoQcDimension {
    pub fn new(score: u32, reasoning: &str) -> Self {
        Self {
            score,
            reasoning: reasoning.to_string(),
        }
    }
}

/// The scored aspects of a generated clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoDimension {
    TechnicalDistortion,
    CinematicImperfections,
    AvatarConsistency,
    ProductConsistency,
    TemporalCoherence,
    HandBodyIntegrity,
    BrandTextAccuracy,
}

impl VideoDimension {
    /// Feedback order.
    pub const ALL: [VideoDimension; 7] = [
        VideoDimension::TechnicalDistortion,
        VideoDimension::CinematicImperfections,
        VideoDimension::AvatarConsistency,
        VideoDimension::ProductConsistency,
        VideoDimension::TemporalCoherence,
        VideoDimension::HandBodyIntegrity,
        VideoDimension::BrandTextAccuracy,
    ];

    /// Key used in judge verdicts and persisted reports.
    pub fn key(&self) -> &'static str {
        match self {
            VideoDimension::TechnicalDistortion => "technical_distortion",
            VideoDimension::CinematicImperfections => "cinematic_imperfections",
            VideoDimension::AvatarConsistency => "avatar_consistency",
            VideoDimension::ProductConsistency => "product_consistency",
            VideoDimension::TemporalCoherence => "temporal_coherence",
            VideoDimension::HandBodyIntegrity => "hand_body_integrity",
            VideoDimension::BrandTextAccuracy => "brand_text_accuracy",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VideoDimension::TechnicalDistortion => "Technical distortion",
            VideoDimension::CinematicImperfections => "Cinematic imperfections",
            VideoDimension::AvatarConsistency => "Avatar consistency",
            VideoDimension::ProductConsistency => "Product consistency",
            VideoDimension::TemporalCoherence => "Temporal coherence",
            VideoDimension::HandBodyIntegrity => "Hand/body integrity",
            VideoDimension::BrandTextAccuracy => "Brand/text accuracy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoQcReport {
    #[serde(default = "legacy_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_distortion: Option<VideoQcDimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cinematic_imperfections: Option<VideoQcDimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_consistency: Option<VideoQcDimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_consistency: Option<VideoQcDimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_coherence: Option<VideoQcDimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hand_body_integrity: Option<VideoQcDimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_text_accuracy: Option<VideoQcDimension>,
    #[serde(default)]
    pub overall_verdict: String,
}

impl Default for VideoQcReport {
    fn default() -> Self {
        Self {
            version: QC_REPORT_VERSION,
            technical_distortion: None,
            cinematic_imperfections: None,
            avatar_consistency: None,
            product_consistency: None,
            temporal_coherence: None,
            hand_body_integrity: None,
            brand_text_accuracy: None,
            overall_verdict: String::new(),
        }
    }
}

impl VideoQcReport {
    pub fn dimension(&self, dim: VideoDimension) -> Option<&VideoQcDimension> {
        match dim {
            VideoDimension::TechnicalDistortion => self.technical_distortion.as_ref(),
            VideoDimension::CinematicImperfections => self.cinematic_imperfections.as_ref(),
            VideoDimension::AvatarConsistency => self.avatar_consistency.as_ref(),
            VideoDimension::ProductConsistency => self.product_consistency.as_ref(),
            VideoDimension::TemporalCoherence => self.temporal_coherence.as_ref(),
            VideoDimension::HandBodyIntegrity => self.hand_body_integrity.as_ref(),
            VideoDimension::BrandTextAccuracy => self.brand_text_accuracy.as_ref(),
        }
    }

    pub fn set_dimension(&mut self, dim: VideoDimension, value: Option<VideoQcDimension>) {
        let slot = match dim {
            VideoDimension::TechnicalDistortion => &mut self.technical_distortion,
            VideoDimension::CinematicImperfections => &mut self.cinematic_imperfections,
            VideoDimension::AvatarConsistency => &mut self.avatar_consistency,
            VideoDimension::ProductConsistency => &mut self.product_consistency,
            VideoDimension::TemporalCoherence => &mut self.temporal_coherence,
            VideoDimension::HandBodyIntegrity => &mut self.hand_body_integrity,
            VideoDimension::BrandTextAccuracy => &mut self.brand_text_accuracy,
        };
        *slot = value;
    }

    /// Scored dimensions in feedback order.
    pub fn present(&self) -> impl Iterator<Item = (VideoDimension, &VideoQcDimension)> + '_ {
        VideoDimension::ALL
            .into_iter()
            .filter_map(move |dim| self.dimension(dim).map(|d| (dim, d)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_video_report_decodes() {
        // Written before hand/body and brand/text were scored.
        let report: VideoQcReport = serde_json::from_value(serde_json::json!({
            "technical_distortion": {"score": 8, "reasoning": "clean"},
            "cinematic_imperfections": {"score": 7, "reasoning": "ok"},
            "avatar_consistency": {"score": 9, "reasoning": "same face"},
            "product_consistency": {"score": 8, "reasoning": "logo intact"},
            "temporal_coherence": {"score": 7, "reasoning": "smooth"},
            "overall_verdict": "good"
        }))
        .unwrap();
        assert_eq!(report.version, 1);
        assert!(report.hand_body_integrity.is_none());
        assert!(report.brand_text_accuracy.is_none());
        assert_eq!(report.present().count(), 5);
    }

    #[test]
    fn test_storyboard_report_without_composition() {
        let report: StoryboardQcReport = serde_json::from_value(serde_json::json!({
            "avatar_validation": {"score": 70, "reason": "a"},
            "product_validation": {"score": 65, "reason": "b"},
            "unexpected": true
        }))
        .unwrap();
        assert_eq!(report.version, 1);
        assert!(report.composition_quality.is_none());
        assert_eq!(report.combined_score(), 135);
    }

    #[test]
    fn test_new_reports_carry_current_version() {
        let report = StoryboardQcReport::new(QcScore::new(1, "a"), QcScore::new(2, "b"), None);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["version"], QC_REPORT_VERSION);
        assert!(json.get("composition_quality").is_none());
    }

    #[test]
    fn test_present_follows_feedback_order() {
        let mut report = VideoQcReport::default();
        report.set_dimension(
            VideoDimension::BrandTextAccuracy,
            Some(VideoQcDimension::new(5, "x")),
        );
        report.set_dimension(
            VideoDimension::TechnicalDistortion,
            Some(VideoQcDimension::new(9, "y")),
        );
        let dims: Vec<_> = report.present().map(|(d, _)| d).collect();
        assert_eq!(
            dims,
            vec![
                VideoDimension::TechnicalDistortion,
                VideoDimension::BrandTextAccuracy
            ]
        );
    }
}
