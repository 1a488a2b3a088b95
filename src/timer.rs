//! The public timer: scheduling, cancellation, purge, and shutdown.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, TimerError};
use crate::task::{Recurrence, Task, TaskCell, TaskHandle};
use crate::worker::{Core, TimerPhase, run_worker};

/// When a task fires for the first time.
///
/// Built from either a relative [`chrono::Duration`] or an absolute
/// [`DateTime<Utc>`] via `Into`, so every schedule method accepts both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTime {
    /// Relative to now. Must be non-negative.
    After(Duration),
    /// At an absolute wall-clock time. Times already in the past fire as
    /// soon as the worker observes them; times before the unix epoch are
    /// rejected.
    At(DateTime<Utc>),
}

impl From<Duration> for StartTime {
    fn from(delay: Duration) -> Self {
        Self::After(delay)
    }
}

impl From<DateTime<Utc>> for StartTime {
    fn from(when: DateTime<Utc>) -> Self {
        Self::At(when)
    }
}

impl StartTime {
    /// Resolve to a non-negative delay from now.
    fn delay_from_now(self) -> Result<StdDuration> {
        match self {
            Self::After(delay) => {
                if delay < Duration::zero() {
                    return Err(TimerError::negative_delay(delay));
                }
                Ok(delay.to_std().unwrap_or(StdDuration::MAX))
            }
            Self::At(when) => {
                if when.timestamp_millis() < 0 {
                    return Err(TimerError::time_before_epoch(when));
                }
                let until = when.signed_duration_since(Utc::now());
                // Overdue times clamp to zero and fire immediately
                Ok(until.to_std().unwrap_or(StdDuration::ZERO))
            }
        }
    }
}

fn validated_period(period: Duration) -> Result<StdDuration> {
    if period <= Duration::zero() {
        return Err(TimerError::non_positive_period(period));
    }
    period
        .to_std()
        .map_err(|_| TimerError::non_positive_period(period))
}

/// A delayed/periodic task timer backed by one dedicated worker.
///
/// All scheduling and cancellation methods are synchronous and callable
/// from any thread; the worker runs as a Tokio task. Argument errors are
/// checked before the timer's state, so a negative delay is reported as
/// such even on a cancelled timer.
///
/// The lifecycle is explicit: [`Timer::start`] spawns the worker,
/// [`Timer::cancel`] stops it, and [`Timer::shutdown`] additionally waits
/// for it to exit. Dropping a `Timer` without cancelling leaves the worker
/// running until the runtime shuts down.
///
/// ```
/// # async fn demo() -> metronome::Result<()> {
/// use chrono::Duration;
/// use metronome::{FnTask, Timer};
///
/// let timer = Timer::start()?;
/// let handle = timer.schedule(FnTask::new(|| println!("tick")), Duration::milliseconds(50))?;
/// # let _ = handle;
/// # timer.shutdown().await
/// # }
/// ```
pub struct Timer {
    core: Arc<Core>,
    worker: JoinHandle<()>,
    name: String,
}

impl Timer {
    /// Start a timer with a generated name.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeUnavailable` when called outside a Tokio runtime.
    pub fn start() -> Result<Self> {
        Self::start_named(format!("timer-{}", Uuid::new_v4()))
    }

    /// Start a timer whose name labels its tracing output.
    ///
    /// # Errors
    ///
    /// Returns `RuntimeUnavailable` when called outside a Tokio runtime.
    pub fn start_named(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|err| TimerError::runtime_unavailable(err.to_string()))?;

        let core = Arc::new(Core::new());
        let worker = runtime.spawn(run_worker(Arc::clone(&core), name.clone()));
        info!(timer = %name, "timer started");

        Ok(Self { core, worker, name })
    }

    /// The timer's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedule a one-shot task.
    ///
    /// # Errors
    ///
    /// Argument errors for an invalid `first` (checked before the timer's
    /// state); `Cancelled` when the timer no longer accepts tasks.
    pub fn schedule<T>(&self, task: T, first: impl Into<StartTime>) -> Result<TaskHandle>
    where
        T: Task + 'static,
    {
        let delay = first.into().delay_from_now()?;
        self.enqueue(Box::new(task), delay, Recurrence::Once)
    }

    /// Schedule a periodic task whose next interval is measured from the
    /// completion of the previous run. A slow run pushes every subsequent
    /// run back; the schedule never catches up.
    ///
    /// # Errors
    ///
    /// Argument errors for an invalid `first` or a non-positive `period`
    /// (checked in that order, before the timer's state); `Cancelled` when
    /// the timer no longer accepts tasks.
    pub fn schedule_with_fixed_delay<T>(
        &self,
        task: T,
        first: impl Into<StartTime>,
        period: Duration,
    ) -> Result<TaskHandle>
    where
        T: Task + 'static,
    {
        let delay = first.into().delay_from_now()?;
        let period = validated_period(period)?;
        self.enqueue(Box::new(task), delay, Recurrence::FixedDelay(period))
    }

    /// Schedule a periodic task on fixed slots: the n-th slot is always
    /// `first + n * period`. Slots missed while a run overslept fire
    /// back-to-back until the schedule has caught up.
    ///
    /// # Errors
    ///
    /// Argument errors for an invalid `first` or a non-positive `period`
    /// (checked in that order, before the timer's state); `Cancelled` when
    /// the timer no longer accepts tasks.
    pub fn schedule_at_fixed_rate<T>(
        &self,
        task: T,
        first: impl Into<StartTime>,
        period: Duration,
    ) -> Result<TaskHandle>
    where
        T: Task + 'static,
    {
        let delay = first.into().delay_from_now()?;
        let period = validated_period(period)?;
        self.enqueue(Box::new(task), delay, Recurrence::FixedRate(period))
    }

    fn enqueue(
        &self,
        job: Box<dyn Task>,
        delay: StdDuration,
        recurrence: Recurrence,
    ) -> Result<TaskHandle> {
        let due = Instant::now() + delay;
        let cell = Arc::new(TaskCell::new(job, recurrence));

        let mut state = self.core.lock();
        if !state.phase.is_active() {
            return Err(TimerError::Cancelled);
        }
        let now_earliest = state
            .queue
            .peek_earliest()
            .is_none_or(|entry| due < entry.due);
        state.queue.insert(due, Arc::clone(&cell));
        drop(state);

        if now_earliest {
            self.core.wakeup.notify_one();
        }
        debug!(
            timer = %self.name,
            task_id = %cell.id(),
            delay_ms = delay.as_millis() as u64,
            "task scheduled"
        );
        Ok(TaskHandle::new(cell))
    }

    /// Cancel the timer.
    ///
    /// No queued task will fire again and the worker exits once any
    /// in-flight run completes. Idempotent. Individual task states are
    /// left untouched: their handles stay queryable and cancellable.
    pub fn cancel(&self) {
        let mut state = self.core.lock();
        let was_active = state.phase.is_active();
        if was_active {
            state.phase = TimerPhase::Cancelled;
        }
        state.queue.clear();
        drop(state);

        self.core.wakeup.notify_one();
        if was_active {
            info!(timer = %self.name, "timer cancelled");
        }
    }

    /// Drop every individually-cancelled task still in the queue.
    ///
    /// Returns how many entries were removed. Safe at any time, including
    /// after [`Timer::cancel`].
    pub fn purge(&self) -> usize {
        let purged = self.core.lock().queue.purge_cancelled();
        if purged > 0 {
            debug!(timer = %self.name, purged, "purged cancelled tasks");
        }
        purged
    }

    /// Number of queued tasks still scheduled to fire.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.core.lock().queue.scheduled_count()
    }

    /// Check if the timer still accepts new tasks.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.core.lock().phase.is_active()
    }

    /// Cancel the timer and wait for the worker to exit.
    ///
    /// # Errors
    ///
    /// `WorkerPanicked` if the worker died of a task panic, whether during
    /// this call or earlier.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel();
        match self.worker.await {
            Ok(()) => Ok(()),
            Err(err) if err.is_panic() => {
                let payload = err.into_panic();
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic payload".to_string());
                Err(TimerError::worker_panicked(reason))
            }
            Err(err) => Err(TimerError::worker_panicked(err.to_string())),
        }
    }
}
