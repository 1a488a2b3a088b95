//! The dedicated worker loop behind each timer.
//!
//! One worker task per timer. The worker takes the shared lock only to
//! inspect or mutate the queue and phase, never across a suspension point
//! or a task execution. Both suspension points (empty queue, earliest task
//! not yet due) wait on the same [`Notify`], so a newly scheduled earlier
//! task or a cancellation promptly interrupts a sleeping worker.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error};

use crate::queue::TaskQueue;
use crate::task::{Recurrence, TaskCell};

/// Lifecycle of a timer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerPhase {
    /// Accepting new tasks; worker running.
    Active,
    /// Cancelled by the owner. Terminal.
    Cancelled,
    /// The worker died of a task panic. Terminal; rejects new scheduling
    /// exactly like `Cancelled`.
    Faulted,
}

impl TimerPhase {
    pub(crate) fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Queue and phase, guarded together by the single timer lock.
pub(crate) struct CoreState {
    pub(crate) queue: TaskQueue,
    pub(crate) phase: TimerPhase,
}

/// State shared between a timer handle and its worker.
pub(crate) struct Core {
    state: Mutex<CoreState>,
    pub(crate) wakeup: Notify,
}

impl Core {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(CoreState {
                queue: TaskQueue::new(),
                phase: TimerPhase::Active,
            }),
            wakeup: Notify::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What the worker decided to do after inspecting the shared state.
enum Step {
    /// Terminal phase reached; exit the loop.
    Exit,
    /// Queue empty; wait for a wakeup.
    Idle,
    /// Earliest task is due at this instant, still in the future.
    Sleep(Instant),
    /// A task is due now.
    Fire(Arc<TaskCell>),
}

fn next_step(core: &Core) -> Step {
    let mut state = core.lock();
    if !state.phase.is_active() {
        return Step::Exit;
    }

    // Entries cancelled while queued are dropped lazily here.
    while state
        .queue
        .peek_earliest()
        .is_some_and(|entry| entry.task.state().is_cancelled())
    {
        let _ = state.queue.pop_earliest();
    }

    if state.queue.is_empty() {
        return Step::Idle;
    }
    let Some(due) = state.queue.peek_earliest().map(|entry| entry.due) else {
        return Step::Idle;
    };
    if due > Instant::now() {
        return Step::Sleep(due);
    }

    let Some(entry) = state.queue.pop_earliest() else {
        return Step::Idle;
    };
    let task = entry.task;
    task.begin_execution(entry.due);
    if let Recurrence::FixedRate(period) = task.recurrence() {
        // Fixed-rate slots advance from the scheduled slot, not from now;
        // overdue slots fire back-to-back until the schedule has caught up.
        state.queue.insert(entry.due + period, Arc::clone(&task));
    }
    Step::Fire(task)
}

/// Execute one due task with no lock held.
async fn fire(core: &Core, task: Arc<TaskCell>) {
    debug!(task_id = %task.id(), "task firing");
    let outcome = AssertUnwindSafe(task.job().run()).catch_unwind().await;
    match outcome {
        Ok(()) => {
            if let Recurrence::FixedDelay(period) = task.recurrence() {
                // Fixed-delay intervals are measured from completion.
                let mut state = core.lock();
                if state.phase.is_active() && task.state().is_scheduled() {
                    state.queue.insert(Instant::now() + period, task);
                }
            }
        }
        Err(payload) => {
            {
                let mut state = core.lock();
                state.phase = TimerPhase::Faulted;
                state.queue.clear();
            }
            error!(task_id = %task.id(), "task panicked; timer worker terminating");
            std::panic::resume_unwind(payload);
        }
    }
}

/// Run the worker until the phase leaves `Active`.
pub(crate) async fn run_worker(core: Arc<Core>, name: String) {
    debug!(timer = %name, "timer worker started");
    loop {
        match next_step(&core) {
            Step::Exit => break,
            Step::Idle => core.wakeup.notified().await,
            Step::Sleep(due) => {
                tokio::select! {
                    () = sleep_until(due) => {}
                    () = core.wakeup.notified() => {}
                }
            }
            Step::Fire(task) => fire(&core, task).await,
        }
    }
    debug!(timer = %name, "timer worker stopped");
}
