//! Pure QC decisions. Nothing here performs I/O.

use crate::models::qc::VideoDimension;
use crate::models::{StoryboardQcReport, VideoQcReport, VideoVariant};

/// Ranking weights in percent; they sum to 100.
const fn weight(dim: VideoDimension) -> u32 {
    match dim {
        VideoDimension::AvatarConsistency => 20,
        VideoDimension::ProductConsistency => 20,
        VideoDimension::HandBodyIntegrity => 15,
        VideoDimension::BrandTextAccuracy => 15,
        VideoDimension::TemporalCoherence => 10,
        VideoDimension::TechnicalDistortion => 10,
        VideoDimension::CinematicImperfections => 10,
    }
}

/// Avatar and product must meet `threshold`. Composition is only checked
/// when requested and present in the report.
pub fn storyboard_passes(
    report: &StoryboardQcReport,
    threshold: u32,
    include_composition: bool,
) -> bool {
    let core = report.avatar_validation.score >= threshold
        && report.product_validation.score >= threshold;
    match (&report.composition_quality, include_composition) {
        (Some(composition), true) => core && composition.score >= threshold,
        _ => core,
    }
}

/// Every scored dimension must meet `threshold`; absent dimensions are
/// skipped.
pub fn video_passes(report: &VideoQcReport, threshold: u32) -> bool {
    report.present().all(|(_, dim)| dim.score >= threshold)
}

/// Weighted score in hundredths of a point (a perfect report is 1000).
pub fn weighted_score(report: &VideoQcReport) -> u32 {
    report
        .present()
        .map(|(dim, value)| value.score * weight(dim))
        .sum()
}

/// Index of the highest weighted variant. Ties go to the lowest index and
/// variants without a report are ignored; `None` when no variant was scored.
pub fn select_best_video_variant(variants: &[VideoVariant]) -> Option<u32> {
    variants
        .iter()
        .filter_map(|v| v.qc_report.as_ref().map(|r| (v.index, weighted_score(r))))
        .fold(None, |best: Option<(u32, u32)>, (index, score)| match best {
            Some((best_index, best_score))
                if best_score > score || (best_score == score && best_index < index) =>
            {
                Some((best_index, best_score))
            }
            _ => Some((index, score)),
        })
        .map(|(index, _)| index)
}

pub fn storyboard_feedback(report: &StoryboardQcReport) -> String {
    let mut lines = vec![
        feedback_line(
            "Avatar validation",
            report.avatar_validation.score,
            100,
            &report.avatar_validation.reason,
        ),
        feedback_line(
            "Product validation",
            report.product_validation.score,
            100,
            &report.product_validation.reason,
        ),
    ];
    if let Some(composition) = &report.composition_quality {
        lines.push(feedback_line(
            "Composition quality",
            composition.score,
            100,
            &composition.reason,
        ));
    }
    lines.join("\n")
}

pub fn video_feedback(report: &VideoQcReport) -> String {
    report
        .present()
        .map(|(dim, value)| feedback_line(dim.label(), value.score, 10, &value.reasoning))
        .collect::<Vec<_>>()
        .join("\n")
}

fn feedback_line(label: &str, score: u32, scale: u32, reason: &str) -> String {
    format!("{} score: {}/{} - {}", label, score, scale, reason)
}
