//! Human review of finished commercials.

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::db::review_repo::{self, ReviewRow};
use crate::db::{job_repo, Database, DatabaseError};
use crate::jobs::JobError;
use crate::models::{Review, ReviewDecision, ReviewStatus};

#[derive(Clone)]
pub struct ReviewService {
    db: Database,
}

impl ReviewService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Opens a pending review, replacing any earlier one for the job.
    pub fn create_review(&self, job_id: &str) -> Result<Review, JobError> {
        self.require_job(job_id)?;
        let review = Review::pending(job_id);
        review_repo::upsert(&self.db, &to_row(&review)?)?;
        info!("Created pending review for job {}", job_id);
        Ok(review)
    }

    pub fn get_review(&self, job_id: &str) -> Result<Option<Review>, JobError> {
        review_repo::find_by_job(&self.db, job_id)?
            .map(from_row)
            .transpose()
    }

    /// Pending reviews, newest job first.
    pub fn pending_reviews(&self) -> Result<Vec<Review>, JobError> {
        review_repo::find_by_status(&self.db, ReviewStatus::Pending.as_str())?
            .into_iter()
            .map(from_row)
            .collect()
    }

    /// Records a verdict. A job without a review gets one on the spot.
    pub fn submit_decision(
        &self,
        job_id: &str,
        decision: ReviewDecision,
    ) -> Result<Review, JobError> {
        self.require_job(job_id)?;
        let review = Review {
            job_id: job_id.to_string(),
            review_status: decision.status,
            reviewed_at: Some(Utc::now()),
            notes: decision.notes,
            scenes_to_regenerate: decision.scenes_to_regenerate,
        };
        review_repo::upsert(&self.db, &to_row(&review)?)?;
        info!(
            "Review decision for job {}: {}",
            job_id, review.review_status
        );
        Ok(review)
    }

    fn require_job(&self, job_id: &str) -> Result<(), JobError> {
        match job_repo::find_by_id(&self.db, job_id)? {
            Some(_) => Ok(()),
            None => Err(JobError::NotFound(job_id.to_string())),
        }
    }
}

fn to_row(review: &Review) -> Result<ReviewRow, JobError> {
    let scenes_to_regenerate_json = if review.scenes_to_regenerate.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&review.scenes_to_regenerate)?)
    };
    Ok(ReviewRow {
        job_id: review.job_id.clone(),
        review_status: review.review_status.as_str().to_string(),
        reviewed_at: review.reviewed_at.map(|t| t.to_rfc3339()),
        notes: review.notes.clone(),
        scenes_to_regenerate_json,
    })
}

fn from_row(row: ReviewRow) -> Result<Review, JobError> {
    let review_status = row
        .review_status
        .parse::<ReviewStatus>()
        .map_err(|reason| DatabaseError::InvalidValue {
            column: "review_status",
            reason,
        })?;
    let reviewed_at = row.reviewed_at.as_deref().and_then(|raw| {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| warn!("Unreadable reviewed_at '{}' for job {}: {}", raw, row.job_id, e))
            .ok()
    });
    let scenes_to_regenerate = match row.scenes_to_regenerate_json.as_deref() {
        Some(raw) => serde_json::from_str(raw)?,
        None => Vec::new(),
    };
    Ok(Review {
        job_id: row.job_id,
        review_status,
        reviewed_at,
        notes: row.notes,
        scenes_to_regenerate,
    })
}
