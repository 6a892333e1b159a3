//! Append-only user-facing pipeline log lines.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct LogRow {
    pub job_id: String,
    pub timestamp: String,
    pub level: String,
    pub message: String,
    pub metadata_json: Option<String>,
}

impl LogRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            job_id: row.get("job_id")?,
            timestamp: row.get("timestamp")?,
            level: row.get("level")?,
            message: row.get("message")?,
            metadata_json: row.get("metadata_json")?,
        })
    }
}

pub fn insert(db: &Database, entry: &LogRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO pipeline_logs (job_id, timestamp, level, message, metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.job_id,
                entry.timestamp,
                entry.level,
                entry.message,
                entry.metadata_json,
            ],
        )?;
        Ok(())
    })
}

/// Lines for one job in insertion order.
pub fn find_by_job(db: &Database, job_id: &str) -> Result<Vec<LogRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM pipeline_logs WHERE job_id = ?1 ORDER BY id ASC")?;
        let rows = stmt
            .query_map(params![job_id], LogRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
