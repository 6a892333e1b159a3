//! Event broadcaster keyed by job id.
//!
//! Each subscriber owns an unbounded channel, so `emit` never waits on a
//! slow or vanished consumer. Closed channels are pruned on the next emit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::Stream;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::models::{EventKind, JobStep, LogLevel, PipelineEvent};

type Subscribers = HashMap<String, Vec<(u64, mpsc::UnboundedSender<PipelineEvent>)>>;

fn lock_or_recover(subscribers: &Mutex<Subscribers>) -> MutexGuard<'_, Subscribers> {
    match subscribers.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Event broadcaster lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// One frame of a job's event stream.
#[derive(Debug, Clone)]
pub enum StreamFrame {
    Event(PipelineEvent),
    Keepalive,
}

impl StreamFrame {
    pub fn to_sse(&self) -> String {
        match self {
            StreamFrame::Event(event) => event.to_sse(),
            StreamFrame::Keepalive => ": keepalive\n\n".to_string(),
        }
    }
}

#[derive(Clone, Default)]
pub struct EventBroadcaster {
    subscribers: Arc<Mutex<Subscribers>>,
    next_id: Arc<AtomicU64>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to every live subscriber of its job.
    pub fn publish(&self, event: PipelineEvent) {
        let mut subscribers = lock_or_recover(&self.subscribers);
        if let Some(list) = subscribers.get_mut(&event.job_id) {
            // Closed receivers drop out here
            list.retain(|(_, sender)| sender.send(event.clone()).is_ok());
            if list.is_empty() {
                subscribers.remove(&event.job_id);
            }
        }
    }

    pub fn emit(&self, job_id: &str, kind: EventKind, data: Value) {
        self.publish(PipelineEvent::new(kind, job_id, data));
    }

    pub fn subscribe(&self, job_id: &str) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        lock_or_recover(&self.subscribers)
            .entry(job_id.to_string())
            .or_default()
            .push((id, sender));

        Subscription {
            id,
            job_id: job_id.to_string(),
            receiver,
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    pub fn subscriber_count(&self, job_id: &str) -> usize {
        lock_or_recover(&self.subscribers)
            .get(job_id)
            .map_or(0, Vec::len)
    }

    /// Drops every subscriber of the job; their streams end.
    pub fn close(&self, job_id: &str) {
        lock_or_recover(&self.subscribers).remove(job_id);
    }

    /// Live stream for one job. Yields a keepalive after `keepalive` of
    /// silence and ends after a terminal event.
    pub fn stream(
        &self,
        job_id: &str,
        keepalive: Duration,
    ) -> impl Stream<Item = StreamFrame> + Send + 'static {
        Self::stream_from(self.subscribe(job_id), None, keepalive)
    }

    /// Like [`EventBroadcaster::stream`] but over an existing subscription,
    /// yielding `first` ahead of live events. A terminal `first` ends the
    /// stream right after it.
    pub fn stream_from(
        mut subscription: Subscription,
        first: Option<PipelineEvent>,
        keepalive: Duration,
    ) -> impl Stream<Item = StreamFrame> + Send + 'static {
        async_stream::stream! {
            if let Some(event) = first {
                let terminal = event.event.is_terminal();
                yield StreamFrame::Event(event);
                if terminal {
                    return;
                }
            }
            loop {
                match tokio::time::timeout(keepalive, subscription.recv()).await {
                    Ok(Some(event)) => {
                        let terminal = event.event.is_terminal();
                        yield StreamFrame::Event(event);
                        if terminal {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(_) => yield StreamFrame::Keepalive,
                }
            }
        }
    }

    pub fn for_job(&self, job_id: &str) -> JobEvents {
        JobEvents {
            job_id: job_id.to_string(),
            broadcaster: self.clone(),
        }
    }
}

/// Receiving half of a subscription. Unsubscribes on drop.
pub struct Subscription {
    id: u64,
    job_id: String,
    receiver: mpsc::UnboundedReceiver<PipelineEvent>,
    subscribers: Arc<Mutex<Subscribers>>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PipelineEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut subscribers = lock_or_recover(&self.subscribers);
        if let Some(list) = subscribers.get_mut(&self.job_id) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                subscribers.remove(&self.job_id);
            }
        }
    }
}

/// Typed emitters for one job's lifecycle events.
#[derive(Clone)]
pub struct JobEvents {
    job_id: String,
    broadcaster: EventBroadcaster,
}

impl JobEvents {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn emit(&self, kind: EventKind, data: Value) {
        self.broadcaster.emit(&self.job_id, kind, data);
    }

    pub fn job_started(&self) {
        self.emit(EventKind::JobStarted, json!({}));
    }

    pub fn step_started(&self, step: JobStep) {
        self.emit(EventKind::StepStarted, json!({ "step": step.as_str() }));
    }

    /// `extra` fields are merged next to `step`.
    pub fn step_completed(&self, step: JobStep, extra: Value) {
        let mut data = json!({ "step": step.as_str() });
        if let (Value::Object(target), Value::Object(fields)) = (&mut data, extra) {
            target.extend(fields);
        }
        self.emit(EventKind::StepCompleted, data);
    }

    pub fn step_progress(&self, step: JobStep, completed: usize, total: usize) {
        let percent = if total == 0 { 100 } else { completed * 100 / total };
        self.emit(
            EventKind::StepProgress,
            json!({
                "step": step.as_str(),
                "completed": completed,
                "total": total,
                "percent": percent,
            }),
        );
    }

    pub fn job_completed(&self, final_video_path: &str) {
        self.emit(
            EventKind::JobCompleted,
            json!({ "final_video_path": final_video_path }),
        );
    }

    pub fn job_failed(&self, error: &str) {
        self.emit(EventKind::JobFailed, json!({ "error": error }));
    }

    pub fn log(&self, level: LogLevel, message: &str, timestamp: &str) {
        self.emit(
            EventKind::Log,
            json!({ "message": message, "level": level.as_str(), "timestamp": timestamp }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let broadcaster = EventBroadcaster::new();
        broadcaster.emit("job", EventKind::JobStarted, json!({}));
        assert_eq!(broadcaster.subscriber_count("job"), 0);
    }

    #[test]
    fn test_fan_out_is_per_job() {
        let broadcaster = EventBroadcaster::new();
        let mut a1 = broadcaster.subscribe("a");
        let mut a2 = broadcaster.subscribe("a");
        let mut b = broadcaster.subscribe("b");

        broadcaster.for_job("a").step_started(JobStep::Script);

        assert_eq!(a1.try_recv().unwrap().data["step"], "script");
        assert_eq!(a2.try_recv().unwrap().event, EventKind::StepStarted);
        assert!(b.try_recv().is_none());
    }

    #[test]
    fn test_drop_unsubscribes() {
        let broadcaster = EventBroadcaster::new();
        let sub = broadcaster.subscribe("job");
        assert_eq!(broadcaster.subscriber_count("job"), 1);
        drop(sub);
        assert_eq!(broadcaster.subscriber_count("job"), 0);
    }

    #[test]
    fn test_step_completed_merges_fields() {
        let broadcaster = EventBroadcaster::new();
        let mut sub = broadcaster.subscribe("job");
        broadcaster
            .for_job("job")
            .step_completed(JobStep::Storyboard, json!({ "num_scenes": 3 }));

        let event = sub.try_recv().unwrap();
        assert_eq!(event.data["step"], "storyboard");
        assert_eq!(event.data["num_scenes"], 3);
    }

    #[tokio::test]
    async fn test_stream_ends_on_terminal_event() {
        let broadcaster = EventBroadcaster::new();
        let stream = broadcaster.stream("job", Duration::from_secs(15));
        let events = broadcaster.for_job("job");
        events.job_started();
        events.job_failed("Pipeline was cancelled");
        events.job_started();

        let frames: Vec<StreamFrame> = stream.collect().await;
        assert_eq!(frames.len(), 2);
        match &frames[1] {
            StreamFrame::Event(event) => {
                assert_eq!(event.event, EventKind::JobFailed);
                assert_eq!(event.data["error"], "Pipeline was cancelled");
            }
            StreamFrame::Keepalive => panic!("expected event"),
        }
    }

    #[tokio::test]
    async fn test_terminal_first_event_ends_stream() {
        let broadcaster = EventBroadcaster::new();
        let subscription = broadcaster.subscribe("job");
        let done = PipelineEvent::new(
            EventKind::JobCompleted,
            "job",
            json!({ "final_video_path": "/runs/job/final/final.mp4" }),
        );
        let stream =
            EventBroadcaster::stream_from(subscription, Some(done), Duration::from_secs(15));

        let frames: Vec<StreamFrame> =
            tokio::time::timeout(Duration::from_secs(1), stream.collect())
                .await
                .expect("stream should end without waiting for live events");
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            StreamFrame::Event(event) => {
                assert_eq!(event.event, EventKind::JobCompleted);
                assert_eq!(event.data["final_video_path"], "/runs/job/final/final.mp4");
            }
            StreamFrame::Keepalive => panic!("expected event"),
        }
        assert_eq!(broadcaster.subscriber_count("job"), 0);
    }

    #[tokio::test]
    async fn test_non_terminal_first_event_continues_live() {
        let broadcaster = EventBroadcaster::new();
        let subscription = broadcaster.subscribe("job");
        let started = PipelineEvent::new(EventKind::JobStarted, "job", json!({}));
        let stream =
            EventBroadcaster::stream_from(subscription, Some(started), Duration::from_secs(15));
        broadcaster.for_job("job").job_completed("/tmp/final.mp4");

        let frames: Vec<StreamFrame> = stream.collect().await;
        assert_eq!(frames.len(), 2);
        assert!(matches!(&frames[1], StreamFrame::Event(e) if e.event == EventKind::JobCompleted));
    }

    #[test]
    fn test_step_progress_reports_percent() {
        let broadcaster = EventBroadcaster::new();
        let mut sub = broadcaster.subscribe("job");
        broadcaster.for_job("job").step_progress(JobStep::Video, 1, 4);

        let event = sub.try_recv().unwrap();
        assert_eq!(event.event, EventKind::StepProgress);
        assert_eq!(event.data["step"], "video");
        assert_eq!(event.data["completed"], 1);
        assert_eq!(event.data["total"], 4);
        assert_eq!(event.data["percent"], 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_sends_keepalive_when_idle() {
        let broadcaster = EventBroadcaster::new();
        let stream = broadcaster.stream("job", Duration::from_secs(15));
        futures_util::pin_mut!(stream);

        let frame = stream.next().await.unwrap();
        assert!(matches!(frame, StreamFrame::Keepalive));
        assert_eq!(frame.to_sse(), ": keepalive\n\n");
    }
}
