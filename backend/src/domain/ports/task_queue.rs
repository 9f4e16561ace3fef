//! Driven port for keyed background tasks.
//!
//! At most one task runs per key. A task is a unit of work plus a completion
//! callback that receives the outcome, including timeouts. Cancelling a task
//! drops it without running the callback.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use super::define_port_error;

/// Boxed task body.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'static>>;

/// Boxed completion callback.
pub type CompletionCallback =
    Box<dyn FnOnce(TaskOutcome) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + 'static>;

/// How a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    Failed { message: String },
    TimedOut,
}

/// A task submitted to the queue.
pub struct TaskJob {
    /// Task key; one active task per key.
    pub key: Uuid,
    /// Upper bound on the body's run time.
    pub timeout: Duration,
    pub work: TaskFuture,
    pub on_complete: CompletionCallback,
}

define_port_error! {
    /// Errors raised by task queue adapters.
    pub enum TaskQueueError {
        /// A task with the same key is still running.
        AlreadyRunning { key: String } => "task {key} is already running",
        /// Waiting for a task exceeded the caller's timeout.
        WaitTimedOut { key: String } => "timed out waiting for task {key}",
    }
}

/// Port for submitting, awaiting, and cancelling keyed tasks.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Start a task.
    fn submit(&self, job: TaskJob) -> Result<(), TaskQueueError>;

    /// Cancel the task for `key`; returns whether one was running.
    fn cancel(&self, key: &Uuid) -> bool;

    /// Whether a task for `key` is running.
    fn is_active(&self, key: &Uuid) -> bool;

    /// Wait until the task for `key` and its callback have finished.
    async fn wait(&self, key: &Uuid, timeout: Duration) -> Result<(), TaskQueueError>;
}
