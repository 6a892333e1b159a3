//! Background task supervision with job-scoped cancellation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct RunningTask {
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Tasks {
    next_generation: u64,
    running: HashMap<String, RunningTask>,
}

/// Runs one background task per job id. Finished tasks deregister
/// themselves; a newer task for the same job replaces (and cancels) an
/// older one.
#[derive(Clone, Default)]
pub struct TaskRunner {
    tasks: Arc<Mutex<Tasks>>,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` with a fresh cancellation token for `job_id`.
    pub fn spawn<F, Fut>(&self, job_id: &str, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let fut = task(token.clone());

        let mut tasks = self.lock();
        tasks.next_generation += 1;
        let generation = tasks.next_generation;

        let registry = Arc::clone(&self.tasks);
        let key = job_id.to_string();
        let handle = tokio::spawn(async move {
            fut.await;
            let mut tasks = match registry.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if tasks
                .running
                .get(&key)
                .is_some_and(|t| t.generation == generation)
            {
                tasks.running.remove(&key);
            }
        });

        if let Some(previous) = tasks.running.insert(
            job_id.to_string(),
            RunningTask {
                generation,
                token,
                handle,
            },
        ) {
            log::warn!("Replacing running task for job {}", job_id);
            previous.token.cancel();
        }
    }

    /// Signals the job's task to stop. Returns false when nothing is running.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.lock().running.get(job_id) {
            Some(task) => {
                task.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.lock()
            .running
            .get(job_id)
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub fn running_count(&self) -> usize {
        self.lock().running.len()
    }

    /// Cancels every task and waits for them to exit.
    pub async fn shutdown(&self) {
        let drained: Vec<RunningTask> = {
            let mut tasks = self.lock();
            tasks.running.drain().map(|(_, task)| task).collect()
        };
        for task in &drained {
            task.token.cancel();
        }
        for task in drained {
            if let Err(e) = task.handle.await {
                log::warn!("Background task ended abnormally: {}", e);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tasks> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Task runner lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_cancel_reaches_task() {
        let runner = TaskRunner::new();
        let (tx, rx) = oneshot::channel();
        runner.spawn("job1", |token| async move {
            token.cancelled().await;
            let _ = tx.send("cancelled");
        });

        assert!(runner.is_running("job1"));
        assert!(runner.cancel("job1"));
        assert_eq!(rx.await.unwrap(), "cancelled");
    }

    #[tokio::test]
    async fn test_finished_task_deregisters() {
        let runner = TaskRunner::new();
        runner.spawn("job2", |_| async {});

        for _ in 0..50 {
            if runner.running_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(runner.running_count(), 0);
        assert!(!runner.cancel("job2"));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_everything() {
        let runner = TaskRunner::new();
        for id in ["a", "b"] {
            runner.spawn(id, |token| async move { token.cancelled().await });
        }
        runner.shutdown().await;
        assert_eq!(runner.running_count(), 0);
    }
}
