//! Shared test utilities for adstudio integration tests.
//!
//! - `TestHarness`: temp output directory, in-memory database and fakes
//! - `fakes`: scripted collaborators and a recording media tool

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::{wait_for_job, wait_until_stopped, TestHarness};
