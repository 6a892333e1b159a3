use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event types carried on a job's stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    JobStarted,
    StepStarted,
    StepProgress,
    StepCompleted,
    SceneProgress,
    QcResult,
    RegenAttempt,
    JobCompleted,
    JobFailed,
    Log,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::JobStarted => "job_started",
            EventKind::StepStarted => "step_started",
            EventKind::StepProgress => "step_progress",
            EventKind::StepCompleted => "step_completed",
            EventKind::SceneProgress => "scene_progress",
            EventKind::QcResult => "qc_result",
            EventKind::RegenAttempt => "regen_attempt",
            EventKind::JobCompleted => "job_completed",
            EventKind::JobFailed => "job_failed",
            EventKind::Log => "log",
        }
    }

    /// Streams close after a terminal event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::JobCompleted | EventKind::JobFailed)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a user-facing pipeline log line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Dim,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Dim => "dim",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub event: EventKind,
    pub job_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(event: EventKind, job_id: &str, data: Value) -> Self {
        Self {
            event,
            job_id: job_id.to_string(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// Flattens `job_id`, `timestamp` and the payload into one object.
    pub fn payload(&self) -> Value {
        let mut merged = Map::new();
        merged.insert("job_id".to_string(), Value::String(self.job_id.clone()));
        merged.insert(
            "timestamp".to_string(),
            Value::String(self.timestamp.to_rfc3339()),
        );
        match &self.data {
            Value::Object(fields) => {
                for (key, value) in fields {
                    merged.insert(key.clone(), value.clone());
                }
            }
            Value::Null => {}
            other => {
                merged.insert("data".to_string(), other.clone());
            }
        }
        Value::Object(merged)
    }

    /// Renders the event as a server-sent-events frame.
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sse_frame_merges_payload() {
        let event = PipelineEvent::new(
            EventKind::StepStarted,
            "job1",
            json!({"step": "storyboard"}),
        );
        let frame = event.to_sse();
        assert!(frame.starts_with("event: step_started\ndata: "));
        assert!(frame.ends_with("\n\n"));

        let payload = event.payload();
        assert_eq!(payload["job_id"], "job1");
        assert_eq!(payload["step"], "storyboard");
        assert!(payload["timestamp"].is_string());
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(EventKind::JobCompleted.is_terminal());
        assert!(EventKind::JobFailed.is_terminal());
        assert!(!EventKind::StepCompleted.is_terminal());
        assert_eq!(
            serde_json::to_string(&EventKind::RegenAttempt).unwrap(),
            "\"regen_attempt\""
        );
    }
}
