//! Job store backed by SQLite.
//!
//! The store is the only writer of persisted job state. Read-modify-write
//! cycles on one job are serialized by a per-job lock, and every write bumps
//! a per-job `watch` channel so waiters (the avatar-selection wait) wake
//! without polling the database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use super::error::JobError;
use crate::db::job_repo::{self, JobFilter, JobRow};
use crate::db::log_repo::{self, LogRow};
use crate::db::Database;
use crate::models::{Job, JobProgress, JobStatus, JobStep, JobUpdate, LogLevel, ScriptRequest};

// ─── Helpers ────────────────────────────────────────────────────────────────

fn lock_or_recover<'a, T>(mutex: &'a Mutex<T>, what: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("{} lock was poisoned, recovering", what);
            poisoned.into_inner()
        }
    }
}

fn new_job_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

// ─── Query types ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
    pub total: u64,
}

/// One persisted user-facing log line.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl From<LogRow> for LogEntry {
    fn from(row: LogRow) -> Self {
        Self {
            timestamp: row.timestamp,
            level: row.level,
            message: row.message,
            metadata: row
                .metadata_json
                .as_deref()
                .and_then(|m| serde_json::from_str(m).ok()),
        }
    }
}

// ─── JobStore ───────────────────────────────────────────────────────────────

pub struct JobStore {
    db: Database,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    watchers: Mutex<HashMap<String, watch::Sender<()>>>,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            locks: Mutex::new(HashMap::new()),
            watchers: Mutex::new(HashMap::new()),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Validates the request and persists a new pending job.
    pub fn create(&self, request: ScriptRequest) -> Result<Job, JobError> {
        request.validate().map_err(JobError::InvalidRequest)?;

        let job = Job::new(&new_job_id(), request);
        job_repo::insert(&self.db, &JobRow::from_job(&job)?)?;
        log::info!("Created job {}", job.job_id);
        Ok(job)
    }

    pub fn get(&self, job_id: &str) -> Result<Option<Job>, JobError> {
        match job_repo::find_by_id(&self.db, job_id)? {
            Some(row) => Ok(Some(row.into_job()?)),
            None => Ok(None),
        }
    }

    /// Like [`JobStore::get`] but a missing job is an error.
    pub fn require(&self, job_id: &str) -> Result<Job, JobError> {
        self.get(job_id)?
            .ok_or_else(|| JobError::NotFound(job_id.to_string()))
    }

    /// Newest first.
    pub fn list(&self, filter: &JobFilter) -> Result<JobListResponse, JobError> {
        let (rows, total) = job_repo::query(&self.db, filter)?;
        let jobs = rows
            .into_iter()
            .map(JobRow::into_job)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(JobListResponse { jobs, total })
    }

    pub fn update(&self, job_id: &str, update: JobUpdate) -> Result<Job, JobError> {
        self.update_with(job_id, |job| {
            update.apply(job);
            Ok(())
        })
    }

    /// Serialized read-modify-write. The closure sees the latest persisted
    /// job; a status change it makes is checked against the allowed
    /// transitions before anything is written.
    pub fn update_with<F>(&self, job_id: &str, mutate: F) -> Result<Job, JobError>
    where
        F: FnOnce(&mut Job) -> Result<(), JobError>,
    {
        self.with_job_lock(job_id, || {
            let mut job = self.require(job_id)?;
            let previous = job.status;
            mutate(&mut job)?;

            if !previous.can_transition_to(job.status) {
                return Err(JobError::InvalidTransition {
                    job_id: job_id.to_string(),
                    from: previous,
                    to: job.status,
                });
            }

            job.updated_at = Utc::now();
            job_repo::update(&self.db, &JobRow::from_job(&job)?)?;
            self.notify(job_id);
            Ok(job)
        })
    }

    pub fn set_progress(&self, job_id: &str, step: JobStep, detail: &str) -> Result<Job, JobError> {
        self.update(
            job_id,
            JobUpdate {
                progress: Some(JobProgress::at(step, detail)),
                ..Default::default()
            },
        )
    }

    /// Moves a pending or running job to cancelled. Returns false when the
    /// job is missing or already finished.
    pub fn cancel(&self, job_id: &str) -> Result<bool, JobError> {
        self.with_job_lock(job_id, || {
            let Some(mut job) = self.get(job_id)? else {
                return Ok(false);
            };
            if !matches!(job.status, JobStatus::Pending | JobStatus::Running) {
                return Ok(false);
            }

            job.status = JobStatus::Cancelled;
            job.updated_at = Utc::now();
            job_repo::update(&self.db, &JobRow::from_job(&job)?)?;
            self.notify(job_id);
            log::info!("Cancelled job {}", job_id);
            Ok(true)
        })
    }

    /// Records the chosen avatar reference, waking any selection wait.
    pub fn select_avatar(&self, job_id: &str, avatar_path: &str) -> Result<Job, JobError> {
        self.update(
            job_id,
            JobUpdate {
                selected_avatar: Some(avatar_path.to_string()),
                ..Default::default()
            },
        )
    }

    /// Change notifications for one job. The receiver fires after every
    /// write, including cancellation.
    pub fn watch(&self, job_id: &str) -> watch::Receiver<()> {
        let mut watchers = lock_or_recover(&self.watchers, "Job watcher");
        watchers.retain(|_, sender| sender.receiver_count() > 0);
        watchers
            .entry(job_id.to_string())
            .or_insert_with(|| watch::channel(()).0)
            .subscribe()
    }

    pub fn add_log(
        &self,
        job_id: &str,
        level: LogLevel,
        message: &str,
        metadata: Option<&Value>,
    ) -> Result<DateTime<Utc>, JobError> {
        let timestamp = Utc::now();
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;
        log_repo::insert(
            &self.db,
            &LogRow {
                job_id: job_id.to_string(),
                timestamp: timestamp.to_rfc3339(),
                level: level.as_str().to_string(),
                message: message.to_string(),
                metadata_json,
            },
        )?;
        Ok(timestamp)
    }

    pub fn logs(&self, job_id: &str) -> Result<Vec<LogEntry>, JobError> {
        Ok(log_repo::find_by_job(&self.db, job_id)?
            .into_iter()
            .map(LogEntry::from)
            .collect())
    }

    /// Runs `f` holding the job's lock. The lock entry is dropped from the
    /// table once no other caller holds or waits on it.
    fn with_job_lock<T>(
        &self,
        job_id: &str,
        f: impl FnOnce() -> Result<T, JobError>,
    ) -> Result<T, JobError> {
        let lock = self.job_lock(job_id);
        let result = {
            let _guard = lock_or_recover(&lock, "Job");
            f()
        };
        drop(lock);

        let mut locks = lock_or_recover(&self.locks, "Job lock table");
        // Clones are only taken under the table lock, so a count of one is stable.
        if locks
            .get(job_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(job_id);
        }
        result
    }

    fn job_lock(&self, job_id: &str) -> Arc<Mutex<()>> {
        let mut locks = lock_or_recover(&self.locks, "Job lock table");
        locks
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn notify(&self, job_id: &str) {
        let mut watchers = lock_or_recover(&self.watchers, "Job watcher");
        if let Some(sender) = watchers.get(job_id) {
            if sender.receiver_count() == 0 {
                watchers.remove(job_id);
            } else {
                sender.send_replace(());
            }
        }
    }

    /// Entries in the lock and watcher tables.
    #[cfg(test)]
    fn table_sizes(&self) -> (usize, usize) {
        (
            lock_or_recover(&self.locks, "Job lock table").len(),
            lock_or_recover(&self.watchers, "Job watcher").len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn store() -> JobStore {
        JobStore::new(Database::open_in_memory().unwrap())
    }

    fn request() -> ScriptRequest {
        ScriptRequest::new("Lamp", "LED desk lamp", "/uploads/lamp.png")
    }

    #[test]
    fn test_create_assigns_short_id() {
        let store = store();
        let job = store.create(request()).unwrap();
        assert_eq!(job.job_id.len(), 12);
        assert_eq!(job.run_id, job.job_id);
        assert_eq!(job.status, JobStatus::Pending);
        assert!(store.get(&job.job_id).unwrap().is_some());
    }

    #[test]
    fn test_create_rejects_invalid_request() {
        let store = store();
        let mut req = request();
        req.scene_count = 9;
        assert!(matches!(
            store.create(req),
            Err(JobError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_update_rejects_backward_transition() {
        let store = store();
        let job = store.create(request()).unwrap();
        store
            .update(&job.job_id, JobUpdate::status(JobStatus::Running))
            .unwrap();
        store
            .update(&job.job_id, JobUpdate::status(JobStatus::Completed))
            .unwrap();

        let err = store
            .update(&job.job_id, JobUpdate::status(JobStatus::Running))
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { .. }));
        assert_eq!(
            store.get(&job.job_id).unwrap().unwrap().status,
            JobStatus::Completed
        );
    }

    #[test]
    fn test_terminal_job_fields_stay_writable() {
        let store = store();
        let job = store.create(request()).unwrap();
        store
            .update(&job.job_id, JobUpdate::failed(JobStatus::Failed, "boom"))
            .unwrap();
        let updated = store
            .update(
                &job.job_id,
                JobUpdate {
                    final_video_path: Some("/output/x/final/commercial.mp4".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, JobStatus::Failed);
        assert!(updated.final_video_path.is_some());
    }

    #[test]
    fn test_cancel_only_from_active_states() {
        let store = store();
        let job = store.create(request()).unwrap();
        assert!(store.cancel(&job.job_id).unwrap());
        assert!(!store.cancel(&job.job_id).unwrap());
        assert!(!store.cancel("missing").unwrap());
        assert_eq!(
            store.get(&job.job_id).unwrap().unwrap().status,
            JobStatus::Cancelled
        );
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let store = Arc::new(store());
        let job = store.create(request()).unwrap();
        let job_id = job.job_id.clone();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let job_id = job_id.clone();
                thread::spawn(move || {
                    store
                        .update_with(&job_id, |job| {
                            let mut variants = job.avatar_variants.take().unwrap_or_default();
                            variants.push(crate::models::AvatarVariant {
                                index: i,
                                image_path: format!("variant_{}.png", i),
                            });
                            job.avatar_variants = Some(variants);
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let job = store.get(&job_id).unwrap().unwrap();
        assert_eq!(job.avatar_variants.unwrap().len(), 8);
    }

    #[test]
    fn test_watch_fires_on_write() {
        let store = store();
        let job = store.create(request()).unwrap();
        let mut rx = store.watch(&job.job_id);
        assert!(!rx.has_changed().unwrap());

        store
            .select_avatar(&job.job_id, "/output/a/avatar_selected.png")
            .unwrap();
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        store.cancel(&job.job_id).unwrap();
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_finished_jobs_leave_no_table_entries() {
        let store = store();
        for _ in 0..100 {
            let job = store.create(request()).unwrap();
            let rx = store.watch(&job.job_id);
            store
                .update(&job.job_id, JobUpdate::status(JobStatus::Running))
                .unwrap();
            drop(rx);
            store
                .update(&job.job_id, JobUpdate::status(JobStatus::Completed))
                .unwrap();
        }
        assert_eq!(store.table_sizes(), (0, 0));
    }

    #[test]
    fn test_live_watcher_survives_writes() {
        let store = store();
        let job = store.create(request()).unwrap();
        let mut rx = store.watch(&job.job_id);

        // A watcher whose receiver is gone is swept by the next watch.
        let other = store.create(request()).unwrap();
        drop(store.watch(&other.job_id));
        let _again = store.watch(&job.job_id);
        assert_eq!(store.table_sizes(), (0, 1));

        store.cancel(&job.job_id).unwrap();
        assert!(rx.has_changed().unwrap());
        let _ = rx.borrow_and_update();

        store
            .update(&job.job_id, JobUpdate::failed(JobStatus::Cancelled, "stopped"))
            .unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(store.table_sizes(), (0, 1));
    }

    #[test]
    fn test_logs_round_trip_in_order() {
        let store = store();
        let job = store.create(request()).unwrap();
        store
            .add_log(&job.job_id, LogLevel::Info, "Generating script...", None)
            .unwrap();
        store
            .add_log(
                &job.job_id,
                LogLevel::Warn,
                "Scene 2 failed QC",
                Some(&serde_json::json!({"scene": 2})),
            )
            .unwrap();

        let logs = store.logs(&job.job_id).unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].level, "info");
        assert_eq!(logs[1].metadata.as_ref().unwrap()["scene"], 2);
    }

    #[test]
    fn test_list_filters_status() {
        let store = store();
        let a = store.create(request()).unwrap();
        store.create(request()).unwrap();
        store.cancel(&a.job_id).unwrap();

        let listed = store
            .list(&JobFilter {
                status: Some(JobStatus::Cancelled),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.jobs[0].job_id, a.job_id);
    }
}
