//! QC service: calls the judge, turns raw verdicts into versioned reports
//! and forwards feedback to the prompt rewriter.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::policy;
use crate::models::qc::VideoDimension;
use crate::models::{
    QcScore, StoryboardQcReport, VideoQcDimension, VideoQcReport, VideoVariant,
};
use crate::providers::{ExternalCallError, PromptRewriter, QcJudge, ReferenceAsset, RetryPolicy};

#[derive(Error, Debug)]
pub enum QcError {
    #[error("QC call failed: {0}")]
    External(#[from] ExternalCallError),

    #[error("Malformed QC verdict: {0}")]
    MalformedVerdict(String),
}

pub struct QcService {
    judge: Arc<dyn QcJudge>,
    rewriter: Arc<dyn PromptRewriter>,
    retry: RetryPolicy,
    storyboard_threshold: u32,
    video_threshold: u32,
}

impl QcService {
    pub fn new(
        judge: Arc<dyn QcJudge>,
        rewriter: Arc<dyn PromptRewriter>,
        retry: RetryPolicy,
        storyboard_threshold: u32,
        video_threshold: u32,
    ) -> Self {
        Self {
            judge,
            rewriter,
            retry,
            storyboard_threshold,
            video_threshold,
        }
    }

    pub fn storyboard_threshold(&self) -> u32 {
        self.storyboard_threshold
    }

    pub fn video_threshold(&self) -> u32 {
        self.video_threshold
    }

    pub async fn qc_storyboard(
        &self,
        avatar: &ReferenceAsset,
        product: &ReferenceAsset,
        candidate: &ReferenceAsset,
    ) -> Result<StoryboardQcReport, QcError> {
        let verdict = self
            .retry
            .run("qc_storyboard", move || {
                self.judge.judge_storyboard(avatar, product, candidate)
            })
            .await?;
        parse_storyboard_verdict(&verdict)
    }

    pub async fn qc_video(
        &self,
        candidate: &ReferenceAsset,
        avatar: &ReferenceAsset,
        product: &ReferenceAsset,
    ) -> Result<VideoQcReport, QcError> {
        let verdict = self
            .retry
            .run("qc_video", move || self.judge.judge_video(candidate, avatar, product))
            .await?;
        parse_video_verdict(&verdict)
    }

    /// `threshold` falls back to the configured storyboard threshold.
    pub fn storyboard_passes(
        &self,
        report: &StoryboardQcReport,
        threshold: Option<u32>,
        include_composition: bool,
    ) -> bool {
        policy::storyboard_passes(
            report,
            threshold.unwrap_or(self.storyboard_threshold),
            include_composition,
        )
    }

    pub fn video_passes(&self, report: &VideoQcReport, threshold: Option<u32>) -> bool {
        policy::video_passes(report, threshold.unwrap_or(self.video_threshold))
    }

    pub fn select_best_video_variant(&self, variants: &[VideoVariant]) -> Option<u32> {
        policy::select_best_video_variant(variants)
    }

    pub async fn rewrite_prompt(
        &self,
        prompt: &str,
        report: &StoryboardQcReport,
    ) -> Result<String, QcError> {
        let feedback = policy::storyboard_feedback(report);
        self.rewrite(prompt, &feedback).await
    }

    /// Returns the feedback transcript alongside the rewritten prompt.
    pub async fn rewrite_video_prompt(
        &self,
        prompt: &str,
        report: &VideoQcReport,
    ) -> Result<(String, String), QcError> {
        let feedback = policy::video_feedback(report);
        let rewritten = self.rewrite(prompt, &feedback).await?;
        Ok((feedback, rewritten))
    }

    async fn rewrite(&self, prompt: &str, feedback: &str) -> Result<String, QcError> {
        let rewritten = self
            .retry
            .run("rewrite_prompt", move || self.rewriter.rewrite(prompt, feedback))
            .await?;
        Ok(rewritten)
    }
}

// ─── Verdict parsing ────────────────────────────────────────────────────────

fn score_in_range(value: &Value, field: &str, max: u32) -> Result<u32, QcError> {
    let raw = value
        .get("score")
        .and_then(Value::as_f64)
        .ok_or_else(|| QcError::MalformedVerdict(format!("'{}' has no numeric score", field)))?;
    let score = raw.round();
    if !(0.0..=f64::from(max)).contains(&score) {
        return Err(QcError::MalformedVerdict(format!(
            "'{}' score {} outside 0-{}",
            field, raw, max
        )));
    }
    Ok(score as u32)
}

fn text_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn parse_qc_score(verdict: &Value, field: &str) -> Result<Option<QcScore>, QcError> {
    match verdict.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(QcScore {
            score: score_in_range(value, field, 100)?,
            reason: text_field(value, "reason"),
        })),
    }
}

pub(crate) fn parse_storyboard_verdict(verdict: &Value) -> Result<StoryboardQcReport, QcError> {
    let required = |field: &str| -> Result<QcScore, QcError> {
        parse_qc_score(verdict, field)?
            .ok_or_else(|| QcError::MalformedVerdict(format!("missing '{}'", field)))
    };
    Ok(StoryboardQcReport::new(
        required("avatar_validation")?,
        required("product_validation")?,
        parse_qc_score(verdict, "composition_quality")?,
    ))
}

pub(crate) fn parse_video_verdict(verdict: &Value) -> Result<VideoQcReport, QcError> {
    let mut report = VideoQcReport::default();
    for dim in VideoDimension::ALL {
        let value = match verdict.get(dim.key()) {
            None | Some(Value::Null) => None,
            Some(value) => Some(VideoQcDimension {
                score: score_in_range(value, dim.key(), 10)?,
                reasoning: text_field(value, "reasoning"),
            }),
        };
        report.set_dimension(dim, value);
    }
    report.overall_verdict = text_field(verdict, "overall_verdict");
    Ok(report)
}
