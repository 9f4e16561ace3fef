//! In-process keyed task queue backed by Tokio tasks.
//!
//! Each submitted job runs on its own Tokio task under a timeout. The
//! completion callback runs on the same task, so waiting for a key waits for
//! both. Cancelling aborts the Tokio task and skips the callback.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::ports::{TaskJob, TaskOutcome, TaskQueue, TaskQueueError};

struct RunningTask {
    generation: u64,
    handle: JoinHandle<()>,
    done: watch::Receiver<bool>,
}

type TaskTable = Arc<Mutex<HashMap<Uuid, RunningTask>>>;

/// Task queue running jobs on the ambient Tokio runtime.
#[derive(Clone, Default)]
pub struct TokioTaskQueue {
    tasks: TaskTable,
    generations: Arc<AtomicU64>,
}

impl TokioTaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock(tasks: &TaskTable) -> MutexGuard<'_, HashMap<Uuid, RunningTask>> {
    // A poisoned table still holds valid handles.
    tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl TaskQueue for TokioTaskQueue {
    fn submit(&self, job: TaskJob) -> Result<(), TaskQueueError> {
        let TaskJob {
            key,
            timeout,
            work,
            on_complete,
        } = job;
        let mut tasks = lock(&self.tasks);
        if tasks.get(&key).is_some_and(|task| !task.handle.is_finished()) {
            return Err(TaskQueueError::already_running(key.to_string()));
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = watch::channel(false);
        let table = Arc::clone(&self.tasks);
        let handle = tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, work).await {
                Ok(Ok(())) => TaskOutcome::Succeeded,
                Ok(Err(message)) => TaskOutcome::Failed { message },
                Err(_) => TaskOutcome::TimedOut,
            };
            debug!(task = %key, ?outcome, "task finished");
            on_complete(outcome).await;

            let mut tasks = lock(&table);
            if tasks.get(&key).is_some_and(|task| task.generation == generation) {
                tasks.remove(&key);
            }
            drop(tasks);
            let _ = done_tx.send(true);
        });
        tasks.insert(
            key,
            RunningTask {
                generation,
                handle,
                done: done_rx,
            },
        );
        Ok(())
    }

    fn cancel(&self, key: &Uuid) -> bool {
        let Some(task) = lock(&self.tasks).remove(key) else {
            return false;
        };
        let running = !task.handle.is_finished();
        task.handle.abort();
        if running {
            warn!(task = %key, "task cancelled");
        }
        running
    }

    fn is_active(&self, key: &Uuid) -> bool {
        lock(&self.tasks)
            .get(key)
            .is_some_and(|task| !task.handle.is_finished())
    }

    async fn wait(&self, key: &Uuid, timeout: Duration) -> Result<(), TaskQueueError> {
        let Some(mut done) = lock(&self.tasks).get(key).map(|task| task.done.clone()) else {
            return Ok(());
        };
        // A dropped sender means the task was aborted; nothing is left to wait for.
        match tokio::time::timeout(timeout, done.wait_for(|finished| *finished)).await {
            Ok(_) => Ok(()),
            Err(_) => Err(TaskQueueError::wait_timed_out(key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Behavioural coverage for keyed task execution.

    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    use rstest::rstest;

    use super::*;
    use crate::domain::ports::CompletionCallback;

    fn recorder() -> (Arc<StdMutex<Vec<TaskOutcome>>>, impl Fn() -> CompletionCallback) {
        let outcomes = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&outcomes);
        let make = move || -> CompletionCallback {
            let sink = Arc::clone(&sink);
            Box::new(move |outcome| {
                Box::pin(async move {
                    sink.lock().expect("outcomes").push(outcome);
                })
            })
        };
        (outcomes, make)
    }

    fn job(
        key: Uuid,
        timeout: Duration,
        work: crate::domain::ports::TaskFuture,
        on_complete: CompletionCallback,
    ) -> TaskJob {
        TaskJob {
            key,
            timeout,
            work,
            on_complete,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn successful_tasks_report_success_after_wait() {
        let queue = TokioTaskQueue::new();
        let (outcomes, callback) = recorder();
        let key = Uuid::new_v4();

        queue
            .submit(job(key, Duration::from_secs(5), Box::pin(async { Ok(()) }), callback()))
            .expect("submit");
        queue.wait(&key, Duration::from_secs(5)).await.expect("wait");

        assert_eq!(
            outcomes.lock().expect("outcomes").as_slice(),
            &[TaskOutcome::Succeeded]
        );
        assert!(!queue.is_active(&key));
    }

    #[rstest]
    #[tokio::test]
    async fn failing_tasks_report_their_message() {
        let queue = TokioTaskQueue::new();
        let (outcomes, callback) = recorder();
        let key = Uuid::new_v4();

        queue
            .submit(job(
                key,
                Duration::from_secs(5),
                Box::pin(async { Err("boom".to_owned()) }),
                callback(),
            ))
            .expect("submit");
        queue.wait(&key, Duration::from_secs(5)).await.expect("wait");

        assert_eq!(
            outcomes.lock().expect("outcomes").as_slice(),
            &[TaskOutcome::Failed {
                message: "boom".to_owned()
            }]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn slow_tasks_time_out() {
        let queue = TokioTaskQueue::new();
        let (outcomes, callback) = recorder();
        let key = Uuid::new_v4();

        queue
            .submit(job(
                key,
                Duration::from_millis(20),
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                }),
                callback(),
            ))
            .expect("submit");
        queue.wait(&key, Duration::from_secs(5)).await.expect("wait");

        assert_eq!(
            outcomes.lock().expect("outcomes").as_slice(),
            &[TaskOutcome::TimedOut]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn one_task_per_key() {
        let queue = TokioTaskQueue::new();
        let (_outcomes, callback) = recorder();
        let key = Uuid::new_v4();
        let pending = || -> crate::domain::ports::TaskFuture {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
        };

        queue
            .submit(job(key, Duration::from_secs(60), pending(), callback()))
            .expect("first submit");
        let err = queue
            .submit(job(key, Duration::from_secs(60), pending(), callback()))
            .expect_err("second submit");

        assert_eq!(err, TaskQueueError::already_running(key.to_string()));
        assert!(queue.cancel(&key));
    }

    #[rstest]
    #[tokio::test]
    async fn cancelled_tasks_skip_the_callback() {
        let queue = TokioTaskQueue::new();
        let (outcomes, callback) = recorder();
        let key = Uuid::new_v4();

        queue
            .submit(job(
                key,
                Duration::from_secs(60),
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                }),
                callback(),
            ))
            .expect("submit");

        assert!(queue.is_active(&key));
        assert!(queue.cancel(&key));
        assert!(!queue.cancel(&key));
        queue.wait(&key, Duration::from_secs(1)).await.expect("wait");
        assert!(outcomes.lock().expect("outcomes").is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn waiting_is_bounded() {
        let queue = TokioTaskQueue::new();
        let (_outcomes, callback) = recorder();
        let key = Uuid::new_v4();

        queue
            .submit(job(
                key,
                Duration::from_secs(60),
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                }),
                callback(),
            ))
            .expect("submit");

        let err = queue
            .wait(&key, Duration::from_millis(20))
            .await
            .expect_err("wait times out");
        assert_eq!(err, TaskQueueError::wait_timed_out(key.to_string()));
        queue.cancel(&key);
    }
}
