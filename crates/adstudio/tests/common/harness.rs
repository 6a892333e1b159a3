//! Isolated engine setup for integration tests.
//!
//! Each harness owns a temp output directory, an in-memory database and a
//! set of fakes whose state the test can inspect after a run.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use adstudio::models::Job;
use adstudio::providers::Collaborators;
use adstudio::{Database, Engine, Settings};

use super::fakes::{
    CallLog, FakeImages, FakeJudge, FakeMediaTool, FakeRewriter, FakeScripts, FakeVideos,
};

pub struct TestHarness {
    temp_dir: TempDir,
    pub output_dir: PathBuf,
    pub settings: Settings,
    pub log: CallLog,
    pub scripts: Arc<FakeScripts>,
    pub images: Arc<FakeImages>,
    pub videos: Arc<FakeVideos>,
    pub judge: Arc<FakeJudge>,
    pub rewriter: Arc<FakeRewriter>,
    pub media: Arc<FakeMediaTool>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    /// Harness with test defaults adjusted by `configure`.
    pub fn with_settings(configure: impl FnOnce(&mut Settings)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let output_dir = temp_dir.path().join("output");

        let mut settings = Settings::default();
        settings.output_dir = output_dir.to_string_lossy().into_owned();
        settings.retry.retries = 0;
        settings.avatar_selection.poll_interval_secs = 0.05;
        settings.avatar_selection.timeout_secs = 30.0;
        settings.max_video_variants = 2;
        configure(&mut settings);

        let log = CallLog::default();
        Self {
            temp_dir,
            output_dir,
            settings,
            scripts: Arc::new(FakeScripts::default()),
            images: Arc::new(FakeImages::default()),
            videos: Arc::new(FakeVideos::new(log.clone())),
            judge: Arc::new(FakeJudge::new()),
            rewriter: Arc::new(FakeRewriter::default()),
            media: Arc::new(FakeMediaTool::new(log.clone())),
            log,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            scripts: self.scripts.clone(),
            images: self.images.clone(),
            videos: self.videos.clone(),
            judge: self.judge.clone(),
            rewriter: self.rewriter.clone(),
            media: self.media.clone(),
        }
    }

    pub fn engine(&self) -> Engine {
        let db = Database::open_in_memory().expect("Failed to open database");
        Engine::new(self.settings.clone(), db, self.collaborators())
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.output_dir.join(run_id)
    }
}

/// Polls the job until `done` holds, panicking after ten seconds.
pub async fn wait_for_job(engine: &Engine, job_id: &str, done: impl Fn(&Job) -> bool) -> Job {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let job = engine
            .get_job(job_id)
            .expect("Failed to load job")
            .expect("Job disappeared");
        if done(&job) {
            return job;
        }
        assert!(
            Instant::now() < deadline,
            "Timed out waiting for job {} (status {})",
            job_id,
            job.status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_until_stopped(engine: &Engine, job_id: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while engine.is_running(job_id) {
        assert!(Instant::now() < deadline, "Pipeline for {} never stopped", job_id);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
