//! Job persistence and background task supervision.

pub mod error;
pub mod runner;
pub mod store;

pub use error::JobError;
pub use runner::TaskRunner;
pub use store::{JobListResponse, JobStore, LogEntry};
