//! Review records, one per job.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct ReviewRow {
    pub job_id: String,
    pub review_status: String,
    pub reviewed_at: Option<String>,
    pub notes: Option<String>,
    pub scenes_to_regenerate_json: Option<String>,
}

impl ReviewRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            review_status: row.get("review_status")?,
            reviewed_at: row.get("reviewed_at")?,
            notes: row.get("notes")?,
            scenes_to_regenerate_json: row.get("scenes_to_regenerate_json")?,
        })
    }
}

/// Inserts the review, replacing any earlier one for the same job.
pub fn upsert(db: &Database, review: &ReviewRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO reviews (job_id, review_status, reviewed_at, notes, scenes_to_regenerate_json)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(job_id) DO UPDATE SET review_status=excluded.review_status,
             reviewed_at=excluded.reviewed_at, notes=excluded.notes,
             scenes_to_regenerate_json=excluded.scenes_to_regenerate_json",
            params![
                review.job_id,
                review.review_status,
                review.reviewed_at,
                review.notes,
                review.scenes_to_regenerate_json,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_job(db: &Database, job_id: &str) -> Result<Option<ReviewRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM reviews WHERE job_id = ?1",
                params![job_id],
                ReviewRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

pub fn find_by_status(db: &Database, status: &str) -> Result<Vec<ReviewRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT r.* FROM reviews r JOIN jobs j ON j.id = r.job_id
             WHERE r.review_status = ?1 ORDER BY j.created_at DESC",
        )?;
        let rows = stmt
            .query_map(params![status], ReviewRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
