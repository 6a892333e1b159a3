use serde_json::json;

use crate::broadcast::JobEvents;
use crate::models::{EventKind, JobStep};

/// Which scene stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneStage {
    Storyboard,
    Video,
}

impl SceneStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneStage::Storyboard => "storyboard",
            SceneStage::Video => "video",
        }
    }

    pub fn step(&self) -> JobStep {
        match self {
            SceneStage::Storyboard => JobStep::Storyboard,
            SceneStage::Video => JobStep::Video,
        }
    }
}

/// Events emitted while scenes are generated.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    RegenAttempt {
        scene_number: u32,
        stage: SceneStage,
        attempt: u32,
    },
    QcResult {
        scene_number: u32,
        stage: SceneStage,
        passed: bool,
        score: u32,
    },
    SceneCompleted {
        scene_number: u32,
        stage: SceneStage,
        completed: usize,
        total: usize,
    },
}

pub trait SceneProgress: Send + Sync {
    fn report(&self, event: SceneEvent);
}

/// No-op reporter for unit tests and single-step runs without observers.
pub struct NoopProgress;

impl SceneProgress for NoopProgress {
    fn report(&self, _event: SceneEvent) {}
}

/// Bridges scene events onto the job's event stream.
pub struct BroadcastProgress {
    events: JobEvents,
}

impl BroadcastProgress {
    pub fn new(events: JobEvents) -> Self {
        Self { events }
    }
}

impl SceneProgress for BroadcastProgress {
    fn report(&self, event: SceneEvent) {
        match event {
            SceneEvent::RegenAttempt {
                scene_number,
                stage,
                attempt,
            } => self.events.emit(
                EventKind::RegenAttempt,
                json!({
                    "scene_number": scene_number,
                    "stage": stage.as_str(),
                    "attempt": attempt,
                }),
            ),
            SceneEvent::QcResult {
                scene_number,
                stage,
                passed,
                score,
            } => self.events.emit(
                EventKind::QcResult,
                json!({
                    "scene_number": scene_number,
                    "stage": stage.as_str(),
                    "passed": passed,
                    "score": score,
                }),
            ),
            SceneEvent::SceneCompleted {
                scene_number,
                stage,
                completed,
                total,
            } => {
                self.events.emit(
                    EventKind::SceneProgress,
                    json!({
                        "scene_number": scene_number,
                        "stage": stage.as_str(),
                        "completed": completed,
                        "total": total,
                    }),
                );
                self.events.step_progress(stage.step(), completed, total);
            }
        }
    }
}
