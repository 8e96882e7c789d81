//! Delivery orchestration (intake-side pipeline).
//!
//! The orchestrator composes the dedup cache, the delivery capability and the
//! retry scheduler into the path every accepted event takes.
//!
//! ## Submission Flow
//!
//! ```text
//! Event + rendered message
//!   ↓
//! 1. Dedup check (duplicate → stop, nothing delivered, nothing scheduled)
//!   ↓
//! 2. Record fingerprint (before delivering, so a concurrent resubmission is caught)
//!   ↓
//! 3. One synchronous delivery attempt
//!   ↓
//! 4. On failure, schedule a retry job (attempt 0, due now)
//! ```
//!
//! ## Failure Handling
//!
//! - A failed first attempt is reported to the caller as `Submission::Failed`;
//!   retrying is a background concern of the `RetryDriver`
//! - A fault while scheduling the retry is logged and swallowed; the caller
//!   still gets `Failed`, with no job attached
//! - Nothing here returns an error: the intake layer acknowledges events
//!   regardless of the downstream outcome

use tracing::{debug, error, info, warn};

use eventrelay_core::{JobId, SharedClock};
use eventrelay_events::{fingerprint, render_message, Event};

use crate::dedup::DeduplicationCache;
use crate::delivery::{deliver_isolated, Delivery};
use crate::retry::{RetryScheduler, RetryableJob, ScheduleOutcome};

/// Result of submitting one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Seen within the TTL; no delivery attempted.
    Duplicate,
    /// Delivered on the first attempt.
    Delivered,
    /// First attempt failed. `retry_job` is set when a retry was scheduled.
    Failed { retry_job: Option<JobId> },
}

impl Submission {
    /// True only when the immediate delivery attempt succeeded.
    pub fn delivered(&self) -> bool {
        matches!(self, Submission::Delivered)
    }
}

#[derive(Debug)]
pub struct DeliveryOrchestrator<C, S, D> {
    cache: C,
    scheduler: S,
    delivery: D,
    clock: SharedClock,
}

impl<C, S, D> DeliveryOrchestrator<C, S, D>
where
    C: DeduplicationCache,
    S: RetryScheduler,
    D: Delivery,
{
    pub fn new(cache: C, scheduler: S, delivery: D, clock: SharedClock) -> Self {
        Self {
            cache,
            scheduler,
            delivery,
            clock,
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Render the notification for `event` and submit it.
    pub fn process(&self, event: &Event) -> Submission {
        let message = render_message(event);
        self.submit(event, &message)
    }

    /// Submit an event with a pre-rendered message.
    pub fn submit(&self, event: &Event, message: &str) -> Submission {
        if self.cache.is_duplicate(event) {
            info!(
                source = %event.source(),
                kind = %event.kind(),
                "duplicate event skipped"
            );
            return Submission::Duplicate;
        }

        self.cache.record(fingerprint(event, self.clock.now()));

        match deliver_isolated(&self.delivery, message) {
            Ok(()) => {
                debug!(source = %event.source(), kind = %event.kind(), "notification delivered");
                Submission::Delivered
            }
            Err(reason) => {
                warn!(
                    source = %event.source(),
                    kind = %event.kind(),
                    error = %reason,
                    "first delivery attempt failed"
                );
                Submission::Failed {
                    retry_job: self.schedule_retry(event, message),
                }
            }
        }
    }

    fn schedule_retry(&self, event: &Event, message: &str) -> Option<JobId> {
        if !self.scheduler.is_enabled() {
            debug!("retry disabled, not scheduling");
            return None;
        }

        let job = RetryableJob::new(
            event.clone(),
            message,
            self.scheduler.policy().max_attempts,
            self.clock.now(),
        );
        let job_id = job.id();

        match self.scheduler.schedule(job) {
            Ok(ScheduleOutcome::Scheduled) => Some(job_id),
            Ok(_) => None,
            Err(err) => {
                error!(job_id = %job_id, error = %err, "failed to schedule retry");
                None
            }
        }
    }
}
