//! Task model: work items, identity, lifecycle state, and handles.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// A unit of deferred work executed by a timer.
///
/// The worker calls [`Task::run`] with no timer lock held, so a slow task
/// delays only the owning timer's next dispatch, never other timers. A
/// panic inside `run` is an unrecoverable fault: it terminates the worker
/// and permanently closes the timer to new scheduling.
#[async_trait]
pub trait Task: Send + Sync {
    /// Perform the work. Called once per firing.
    async fn run(&self);
}

/// Adapter running a plain closure as a [`Task`].
pub struct FnTask<F> {
    f: F,
}

impl<F> FnTask<F>
where
    F: Fn() + Send + Sync,
{
    /// Wrap a closure.
    #[must_use]
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Task for FnTask<F>
where
    F: Fn() + Send + Sync,
{
    async fn run(&self) {
        (self.f)();
    }
}

/// Unique identifier for a scheduled task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new unique task ID.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("task-{}", Uuid::new_v4()))
    }

    /// Create a task ID from an existing string.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in the queue. Periodic tasks stay here across firings.
    Scheduled,
    /// One-shot task taken for execution; will not fire again.
    Executed,
    /// Cancelled; will never run again, even if already due.
    Cancelled,
}

impl TaskState {
    /// Check if the task is still scheduled to fire.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled)
    }

    /// Check if the task has been taken for its one execution.
    #[must_use]
    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed)
    }

    /// Check if the task was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// How a task recurs after its first firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recurrence {
    /// Fire once.
    Once,
    /// Re-fire `period` after each run completes.
    FixedDelay(Duration),
    /// Fire on fixed slots `first + n * period`.
    FixedRate(Duration),
}

/// Per-task bookkeeping, independent of the queue lock.
struct Progress {
    state: TaskState,
    last_slot: Option<Instant>,
}

/// One scheduled task: identity, recurrence, the work item, and state.
///
/// Lock order is always core lock before this cell's lock; the cell lock is
/// never held while taking the core lock.
pub(crate) struct TaskCell {
    id: TaskId,
    recurrence: Recurrence,
    job: Box<dyn Task>,
    progress: Mutex<Progress>,
}

impl TaskCell {
    pub(crate) fn new(job: Box<dyn Task>, recurrence: Recurrence) -> Self {
        Self {
            id: TaskId::new(),
            recurrence,
            job,
            progress: Mutex::new(Progress {
                state: TaskState::Scheduled,
                last_slot: None,
            }),
        }
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn id(&self) -> &TaskId {
        &self.id
    }

    pub(crate) fn recurrence(&self) -> Recurrence {
        self.recurrence
    }

    pub(crate) fn job(&self) -> &dyn Task {
        self.job.as_ref()
    }

    pub(crate) fn state(&self) -> TaskState {
        self.progress().state
    }

    /// Flip to cancelled. Returns `true` iff the task was still scheduled.
    pub(crate) fn cancel(&self) -> bool {
        let mut progress = self.progress();
        if progress.state.is_scheduled() {
            progress.state = TaskState::Cancelled;
            true
        } else {
            false
        }
    }

    /// Record the slot being fired. One-shot tasks transition to
    /// `Executed` here, before the run starts.
    pub(crate) fn begin_execution(&self, slot: Instant) {
        let mut progress = self.progress();
        progress.last_slot = Some(slot);
        if matches!(self.recurrence, Recurrence::Once) {
            progress.state = TaskState::Executed;
        }
    }

    pub(crate) fn scheduled_execution_time(&self) -> Option<Instant> {
        self.progress().last_slot
    }
}

/// Handle to a scheduled task.
///
/// Cancelling through the handle only prevents this task's own future
/// firings; the owning timer and its other tasks are unaffected. The
/// handle stays queryable after the timer itself is cancelled.
#[derive(Clone)]
pub struct TaskHandle {
    cell: Arc<TaskCell>,
}

impl TaskHandle {
    pub(crate) fn new(cell: Arc<TaskCell>) -> Self {
        Self { cell }
    }

    /// The task's unique ID.
    #[must_use]
    pub fn id(&self) -> &TaskId {
        self.cell.id()
    }

    /// Cancel this task.
    ///
    /// Returns `true` iff the task was newly cancelled, i.e. it was still
    /// scheduled to fire at least once more. Returns `false` for a task
    /// that was already cancelled or a one-shot that has already run.
    pub fn cancel(&self) -> bool {
        let newly_cancelled = self.cell.cancel();
        if newly_cancelled {
            debug!(task_id = %self.cell.id(), "task cancelled");
        }
        newly_cancelled
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.cell.state()
    }

    /// Check if the task has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state().is_cancelled()
    }

    /// The most recent time slot this task was taken for execution, if it
    /// has fired at all.
    #[must_use]
    pub fn scheduled_execution_time(&self) -> Option<Instant> {
        self.cell.scheduled_execution_time()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", self.cell.id())
            .field("state", &self.state())
            .finish()
    }
}
