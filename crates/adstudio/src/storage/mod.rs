pub mod run_storage;

pub use run_storage::{RunStorage, SelectedClip};
