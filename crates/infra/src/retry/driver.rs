//! Retry driver: drains due jobs and re-attempts delivery.

use serde::Serialize;
use tracing::{debug, error, info};

use eventrelay_core::JobId;

use super::scheduler::{RetryError, RetryScheduler};
use super::types::{Completion, RetryableJob};
use crate::delivery::{deliver_isolated, Delivery};

/// Outcome counts for one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub due: usize,
    pub succeeded: usize,
    pub rescheduled: usize,
    pub exhausted: usize,
    /// Jobs whose completion could not be recorded.
    pub faults: usize,
}

/// Pulls due jobs from a scheduler and hands their messages to delivery.
///
/// Every job in a pass is attempted independently: a failed or panicking
/// delivery is recorded against that job only.
#[derive(Debug)]
pub struct RetryDriver<S, D> {
    scheduler: S,
    delivery: D,
}

impl<S: RetryScheduler, D: Delivery> RetryDriver<S, D> {
    pub fn new(scheduler: S, delivery: D) -> Self {
        Self {
            scheduler,
            delivery,
        }
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Run one pass over the currently due jobs.
    pub fn run_pass(&self) -> DrainReport {
        let mut report = DrainReport::default();

        let due = match self.scheduler.due_jobs() {
            Ok(due) => due,
            Err(err) => {
                error!(error = %err, "failed to read due retry jobs");
                report.faults += 1;
                return report;
            }
        };

        if due.is_empty() {
            debug!("no retry jobs due");
            return report;
        }

        report.due = due.len();
        info!(count = report.due, "processing due retry jobs");

        for job in &due {
            match self.attempt(job) {
                Ok(Completion::Succeeded) => report.succeeded += 1,
                Ok(Completion::Rescheduled { .. }) => report.rescheduled += 1,
                Ok(Completion::Exhausted) => report.exhausted += 1,
                Ok(Completion::Unknown) => {}
                Err(err) => {
                    error!(job_id = %job.id(), error = %err, "failed to record retry outcome");
                    report.faults += 1;
                }
            }
        }

        report
    }

    /// Retry one scheduled job now, whether or not it is due.
    pub fn retry_job(&self, job_id: JobId) -> Result<Completion, RetryError> {
        if !self.scheduler.is_enabled() {
            return Err(RetryError::Disabled);
        }

        let job = self
            .scheduler
            .scheduled_job(job_id)?
            .ok_or(RetryError::JobNotFound(job_id))?;

        info!(job_id = %job_id, attempt = job.attempt_count() + 1, "manual retry requested");
        self.attempt(&job)
    }

    fn attempt(&self, job: &RetryableJob) -> Result<Completion, RetryError> {
        debug!(job_id = %job.id(), attempt = job.attempt_count() + 1, "retrying delivery");

        match deliver_isolated(&self.delivery, job.message()) {
            Ok(()) => self.scheduler.complete(job.id(), Ok(())),
            Err(reason) => {
                debug!(job_id = %job.id(), error = %reason, "retry delivery failed");
                self.scheduler.complete(job.id(), Err(&reason))
            }
        }
    }
}
