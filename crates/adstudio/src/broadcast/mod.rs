//! Per-job event fan-out for live progress streaming.

pub mod event_broadcaster;

pub use event_broadcaster::{EventBroadcaster, JobEvents, StreamFrame, Subscription};
