//! Retry scheduling for failed notification deliveries.
//!
//! ## Lifecycle
//!
//! A job is created when the first delivery attempt fails. It then lives in the
//! scheduled set until one of:
//!
//! - a retry succeeds (completed-success)
//! - the last allowed attempt fails (completed-failed)
//! - it outlives the age ceiling and cleanup drops it (completed-failed)
//!
//! Completed jobs are kept only for stats and age out on the same ceiling.
//!
//! ## Components
//!
//! - `RetryableJob`: immutable job value; transitions return a new value
//! - `RetryScheduler`: owns the scheduled and completed sets
//! - `RetryDriver`: periodically drains due jobs through a `Delivery`

pub mod driver;
pub mod scheduler;
pub mod types;

pub use driver::{DrainReport, RetryDriver};
pub use scheduler::{CleanupReport, InMemoryRetryScheduler, RetryError, RetryScheduler, RetryStats};
pub use types::{
    CompletedJob, Completion, JobOutcome, RetryPolicy, RetryableJob, ScheduleOutcome,
};
