//! # Metronome
//!
//! Delayed and periodic task execution on a single dedicated worker.
//!
//! Each [`Timer`] owns one background worker that takes the earliest-due
//! task from a shared queue, suspends until its due time, runs it, and
//! reschedules it if periodic. Scheduling an earlier task or cancelling the
//! timer promptly interrupts a sleeping worker.
//!
//! # Key Types
//!
//! - [`Timer`]: schedules tasks, cancels the whole timer, purges cancelled
//!   entries
//! - [`Task`]: the work-item capability; [`FnTask`] adapts plain closures
//! - [`TaskHandle`]: per-task cancellation and state queries
//! - [`StartTime`]: first fire as a relative delay or an absolute time
//!
//! # Periodic Semantics
//!
//! Fixed-rate tasks keep their original slots (`first + n * period`) and
//! fire a compensating burst after a run oversleeps; fixed-delay tasks
//! measure each interval from the completion of the previous run and never
//! catch up.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod error;
mod queue;
mod task;
mod timer;
mod worker;

pub use error::{Result, TimerError};
pub use task::{FnTask, Task, TaskHandle, TaskId, TaskState};
pub use timer::{StartTime, Timer};
