//! CRUD for the `jobs` table. Nested results live in JSON text columns.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{Database, DatabaseError};
use crate::models::{Job, JobStatus};

#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub run_id: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    pub request_json: String,
    pub progress_json: Option<String>,
    pub script_json: Option<String>,
    pub avatar_variants_json: Option<String>,
    pub selected_avatar: Option<String>,
    pub storyboard_results_json: Option<String>,
    pub video_results_json: Option<String>,
    pub final_video_path: Option<String>,
    pub error: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            run_id: row.get("run_id")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            request_json: row.get("request_json")?,
            progress_json: row.get("progress_json")?,
            script_json: row.get("script_json")?,
            avatar_variants_json: row.get("avatar_variants_json")?,
            selected_avatar: row.get("selected_avatar")?,
            storyboard_results_json: row.get("storyboard_results_json")?,
            video_results_json: row.get("video_results_json")?,
            final_video_path: row.get("final_video_path")?,
            error: row.get("error")?,
        })
    }

    pub fn from_job(job: &Job) -> Result<Self, DatabaseError> {
        Ok(Self {
            id: job.job_id.clone(),
            run_id: job.run_id.clone(),
            status: job.status.as_str().to_string(),
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
            request_json: encode("request_json", &job.request)?,
            progress_json: encode_opt("progress_json", &job.progress)?,
            script_json: encode_opt("script_json", &job.script)?,
            avatar_variants_json: encode_opt("avatar_variants_json", &job.avatar_variants)?,
            selected_avatar: job.selected_avatar.clone(),
            storyboard_results_json: encode_opt(
                "storyboard_results_json",
                &job.storyboard_results,
            )?,
            video_results_json: encode_opt("video_results_json", &job.video_results)?,
            final_video_path: job.final_video_path.clone(),
            error: job.error.clone(),
        })
    }

    pub fn into_job(self) -> Result<Job, DatabaseError> {
        let status: JobStatus = self
            .status
            .parse()
            .map_err(|reason| DatabaseError::InvalidValue {
                column: "status",
                reason,
            })?;
        Ok(Job {
            job_id: self.id,
            run_id: self.run_id,
            status,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
            request: decode("request_json", &self.request_json)?,
            progress: decode_opt("progress_json", self.progress_json.as_deref())?,
            script: decode_opt("script_json", self.script_json.as_deref())?,
            avatar_variants: decode_opt(
                "avatar_variants_json",
                self.avatar_variants_json.as_deref(),
            )?,
            selected_avatar: self.selected_avatar,
            storyboard_results: decode_opt(
                "storyboard_results_json",
                self.storyboard_results_json.as_deref(),
            )?,
            video_results: decode_opt("video_results_json", self.video_results_json.as_deref())?,
            final_video_path: self.final_video_path,
            error: self.error,
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO jobs (id, run_id, status, created_at, updated_at, request_json,
             progress_json, script_json, avatar_variants_json, selected_avatar,
             storyboard_results_json, video_results_json, final_video_path, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                job.id,
                job.run_id,
                job.status,
                job.created_at,
                job.updated_at,
                job.request_json,
                job.progress_json,
                job.script_json,
                job.avatar_variants_json,
                job.selected_avatar,
                job.storyboard_results_json,
                job.video_results_json,
                job.final_video_path,
                job.error,
            ],
        )?;
        Ok(())
    })
}

/// Overwrites every column except `id`, `run_id` and `created_at`.
pub fn update(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE jobs SET status=?2, updated_at=?3, request_json=?4, progress_json=?5,
             script_json=?6, avatar_variants_json=?7, selected_avatar=?8,
             storyboard_results_json=?9, video_results_json=?10, final_video_path=?11,
             error=?12
             WHERE id=?1",
            params![
                job.id,
                job.status,
                job.updated_at,
                job.request_json,
                job.progress_json,
                job.script_json,
                job.avatar_variants_json,
                job.selected_avatar,
                job.storyboard_results_json,
                job.video_results_json,
                job.final_video_path,
                job.error,
            ],
        )?;
        Ok(())
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Newest first. Returns (rows, total matching count).
pub fn query(db: &Database, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let where_clause = if filter.status.is_some() {
            "WHERE status = ?1"
        } else {
            ""
        };
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(status) = filter.status {
            param_values.push(Box::new(status.as_str().to_string()));
        }

        let count_sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let total: u64 = conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?;

        param_values.push(Box::new(filter.limit.unwrap_or(100) as i64));
        param_values.push(Box::new(filter.offset.unwrap_or(0) as i64));
        let query_sql = format!(
            "SELECT * FROM jobs {} ORDER BY created_at DESC, rowid DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            param_values.len() - 1,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&query_sql)?;
        let rows: Vec<JobRow> = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((rows, total))
    })
}

pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

// ─── JSON columns ───────────────────────────────────────────────────────────

fn encode<T: Serialize>(column: &'static str, value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|source| DatabaseError::Json { column, source })
}

fn encode_opt<T: Serialize>(
    column: &'static str,
    value: &Option<T>,
) -> Result<Option<String>, DatabaseError> {
    value.as_ref().map(|v| encode(column, v)).transpose()
}

fn decode<T: DeserializeOwned>(column: &'static str, text: &str) -> Result<T, DatabaseError> {
    serde_json::from_str(text).map_err(|source| DatabaseError::Json { column, source })
}

fn decode_opt<T: DeserializeOwned>(
    column: &'static str,
    text: Option<&str>,
) -> Result<Option<T>, DatabaseError> {
    text.map(|t| decode(column, t)).transpose()
}

fn parse_timestamp(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("Unparseable timestamp '{}': {}", text, e);
            Utc::now()
        })
}
