//! Retry scheduling: the set of in-flight jobs and their transitions.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use eventrelay_core::{JobId, SharedClock};

use super::types::{
    CompletedJob, Completion, JobOutcome, RetryPolicy, RetryableJob, ScheduleOutcome,
};
use crate::config::RetryConfig;

/// Retry scheduler abstraction.
pub trait RetryScheduler: Send + Sync {
    fn is_enabled(&self) -> bool;

    fn policy(&self) -> &RetryPolicy;

    /// Insert (or overwrite by id) a job in the scheduled set.
    fn schedule(&self, job: RetryableJob) -> Result<ScheduleOutcome, RetryError>;

    /// Scheduled jobs whose next attempt time has passed. Order is unspecified.
    fn due_jobs(&self) -> Result<Vec<RetryableJob>, RetryError>;

    /// Look up a scheduled job regardless of whether it is due.
    fn scheduled_job(&self, job_id: JobId) -> Result<Option<RetryableJob>, RetryError>;

    /// Record the result of an attempt: `Ok(())` on success, `Err(reason)` on failure.
    fn complete(&self, job_id: JobId, result: Result<(), &str>) -> Result<Completion, RetryError>;

    /// Drop scheduled jobs past the age ceiling and prune old history.
    fn cleanup(&self) -> Result<CleanupReport, RetryError>;

    fn stats(&self) -> Result<RetryStats, RetryError>;
}

/// Retry scheduler error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetryError {
    #[error("retry is disabled")]
    Disabled,
    #[error("job not scheduled: {0}")]
    JobNotFound(JobId),
    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
}

/// Result of a cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Scheduled jobs that aged out and were marked failed.
    pub expired: usize,
    /// Completed jobs removed from history.
    pub pruned: usize,
}

/// Point-in-time scheduler statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryStats {
    pub enabled: bool,
    pub scheduled_total: usize,
    /// Scheduled jobs keyed by the attempt number they are waiting for (1..=max).
    pub scheduled_by_attempt: BTreeMap<u32, usize>,
    pub completed_total: usize,
    pub completed_successful: usize,
    pub completed_failed: usize,
}

impl RetryStats {
    /// Flat key/value view (`scheduled_attempt_1`, `completed_failed`, ...).
    pub fn to_map(&self) -> BTreeMap<String, usize> {
        let mut map = BTreeMap::new();
        map.insert("scheduled_total".to_string(), self.scheduled_total);
        for (attempt, count) in &self.scheduled_by_attempt {
            map.insert(format!("scheduled_attempt_{attempt}"), *count);
        }
        map.insert("completed_total".to_string(), self.completed_total);
        map.insert("completed_successful".to_string(), self.completed_successful);
        map.insert("completed_failed".to_string(), self.completed_failed);
        map
    }
}

/// In-memory retry scheduler.
///
/// Locks are always taken in the order scheduled, then completed, and are never
/// held across a delivery call.
#[derive(Debug)]
pub struct InMemoryRetryScheduler {
    enabled: bool,
    policy: RetryPolicy,
    clock: SharedClock,
    scheduled: RwLock<HashMap<JobId, RetryableJob>>,
    completed: RwLock<HashMap<JobId, CompletedJob>>,
}

impl InMemoryRetryScheduler {
    pub fn new(policy: RetryPolicy, clock: SharedClock) -> Self {
        Self {
            enabled: true,
            policy,
            clock,
            scheduled: RwLock::new(HashMap::new()),
            completed: RwLock::new(HashMap::new()),
        }
    }

    /// A scheduler that discards everything handed to it.
    pub fn disabled(clock: SharedClock) -> Self {
        Self {
            enabled: false,
            ..Self::new(RetryPolicy::default(), clock)
        }
    }

    pub fn from_config(config: &RetryConfig, clock: SharedClock) -> Self {
        let policy = RetryPolicy::from_config(config);
        if config.enabled {
            Self::new(policy, clock)
        } else {
            Self {
                enabled: false,
                ..Self::new(policy, clock)
            }
        }
    }

    pub fn arc(policy: RetryPolicy, clock: SharedClock) -> Arc<Self> {
        Arc::new(Self::new(policy, clock))
    }

    /// Completed history entry for `job_id`, if still retained.
    pub fn completed_job(&self, job_id: JobId) -> Result<Option<CompletedJob>, RetryError> {
        Ok(self.read_completed()?.get(&job_id).cloned())
    }

    fn read_scheduled(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, RetryableJob>>, RetryError> {
        self.scheduled
            .read()
            .map_err(|_| RetryError::Poisoned("scheduled jobs"))
    }

    fn write_scheduled(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<JobId, RetryableJob>>, RetryError> {
        self.scheduled
            .write()
            .map_err(|_| RetryError::Poisoned("scheduled jobs"))
    }

    fn read_completed(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, CompletedJob>>, RetryError> {
        self.completed
            .read()
            .map_err(|_| RetryError::Poisoned("completed jobs"))
    }

    fn write_completed(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<JobId, CompletedJob>>, RetryError> {
        self.completed
            .write()
            .map_err(|_| RetryError::Poisoned("completed jobs"))
    }

    /// Insert `job` into the scheduled set, or straight into history when it has
    /// no attempts left. Callers hold the scheduled lock; completed is taken after it.
    fn place(
        &self,
        scheduled: &mut HashMap<JobId, RetryableJob>,
        job: RetryableJob,
    ) -> Result<ScheduleOutcome, RetryError> {
        if job.has_exhausted_attempts() {
            let error = job
                .last_error()
                .unwrap_or("max attempts exceeded")
                .to_string();
            error!(
                job_id = %job.id(),
                attempts = job.attempt_count(),
                error = %error,
                "job exceeded max attempts, not scheduling"
            );
            scheduled.remove(&job.id());
            let mut completed = self.write_completed()?;
            finish(&mut completed, job, JobOutcome::Failed { error }, self.clock.now());
            return Ok(ScheduleOutcome::Exhausted);
        }

        info!(
            job_id = %job.id(),
            attempt = job.attempt_count() + 1,
            next_retry_at = %job.next_retry_at(),
            "retry scheduled"
        );
        scheduled.insert(job.id(), job);
        Ok(ScheduleOutcome::Scheduled)
    }
}

fn finish(
    completed: &mut HashMap<JobId, CompletedJob>,
    job: RetryableJob,
    outcome: JobOutcome,
    now: DateTime<Utc>,
) {
    completed.insert(
        job.id(),
        CompletedJob {
            job,
            outcome,
            completed_at: now,
        },
    );
}

impl RetryScheduler for InMemoryRetryScheduler {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn schedule(&self, job: RetryableJob) -> Result<ScheduleOutcome, RetryError> {
        if !self.enabled {
            debug!(job_id = %job.id(), "retry disabled, discarding job");
            return Ok(ScheduleOutcome::Discarded);
        }

        let mut scheduled = self.write_scheduled()?;
        self.place(&mut scheduled, job)
    }

    fn due_jobs(&self) -> Result<Vec<RetryableJob>, RetryError> {
        if !self.enabled {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let due: Vec<_> = self
            .read_scheduled()?
            .values()
            .filter(|job| job.is_due(now))
            .cloned()
            .collect();

        if !due.is_empty() {
            debug!(count = due.len(), "found jobs ready for retry");
        }
        Ok(due)
    }

    fn scheduled_job(&self, job_id: JobId) -> Result<Option<RetryableJob>, RetryError> {
        Ok(self.read_scheduled()?.get(&job_id).cloned())
    }

    fn complete(&self, job_id: JobId, result: Result<(), &str>) -> Result<Completion, RetryError> {
        // The scheduled guard stays alive until the job lands in history or back in
        // the scheduled set, so `stats` never sees it in neither or both.
        let mut scheduled = self.write_scheduled()?;
        let Some(job) = scheduled.remove(&job_id) else {
            warn!(job_id = %job_id, "completion for unknown job");
            return Ok(Completion::Unknown);
        };

        let now = self.clock.now();

        match result {
            Ok(()) => {
                info!(
                    job_id = %job_id,
                    attempt = job.attempt_count() + 1,
                    "retry succeeded"
                );
                let mut completed = self.write_completed()?;
                finish(&mut completed, job.succeeded(), JobOutcome::Succeeded, now);
                Ok(Completion::Succeeded)
            }
            Err(reason) if job.is_last_attempt() => {
                error!(
                    job_id = %job_id,
                    attempts = job.attempt_count() + 1,
                    error = %reason,
                    "retry permanently failed"
                );
                let mut completed = self.write_completed()?;
                finish(
                    &mut completed,
                    job.failed(reason),
                    JobOutcome::Failed {
                        error: reason.to_string(),
                    },
                    now,
                );
                Ok(Completion::Exhausted)
            }
            Err(reason) => {
                let delay = self.policy.delay_for_attempt(job.attempt_count() + 1);
                let next = job.rescheduled(reason, delay, now);
                let next_retry_at = next.next_retry_at();

                warn!(
                    job_id = %job_id,
                    attempt = next.attempt_count(),
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "retry failed, rescheduling"
                );

                match self.place(&mut scheduled, next)? {
                    ScheduleOutcome::Scheduled => Ok(Completion::Rescheduled { next_retry_at }),
                    ScheduleOutcome::Exhausted | ScheduleOutcome::Discarded => {
                        Ok(Completion::Exhausted)
                    }
                }
            }
        }
    }

    fn cleanup(&self) -> Result<CleanupReport, RetryError> {
        let now = self.clock.now();
        let ceiling = self.policy.max_age_chrono();

        let mut scheduled = self.write_scheduled()?;
        let ids: Vec<JobId> = scheduled
            .values()
            .filter(|job| job.is_expired(ceiling, now))
            .map(RetryableJob::id)
            .collect();
        let expired: Vec<RetryableJob> = ids.iter().filter_map(|id| scheduled.remove(id)).collect();

        let mut report = CleanupReport {
            expired: expired.len(),
            pruned: 0,
        };

        let mut completed = self.write_completed()?;
        let before = completed.len();
        completed.retain(|_, entry| now - entry.completed_at < ceiling);
        report.pruned = before - completed.len();

        for job in expired {
            warn!(job_id = %job.id(), attempts = job.attempt_count(), "dropping expired retry job");
            let error = "exceeded max retry age".to_string();
            finish(&mut completed, job, JobOutcome::Failed { error }, now);
        }
        drop(completed);
        drop(scheduled);

        if report.expired > 0 || report.pruned > 0 {
            info!(
                expired = report.expired,
                pruned = report.pruned,
                "retry cleanup completed"
            );
        }
        Ok(report)
    }

    fn stats(&self) -> Result<RetryStats, RetryError> {
        let mut stats = RetryStats {
            enabled: self.enabled,
            ..Default::default()
        };

        for attempt in 1..=self.policy.max_attempts {
            stats.scheduled_by_attempt.insert(attempt, 0);
        }

        let scheduled = self.read_scheduled()?;
        let completed = self.read_completed()?;

        stats.scheduled_total = scheduled.len();
        for job in scheduled.values() {
            *stats
                .scheduled_by_attempt
                .entry(job.attempt_count() + 1)
                .or_insert(0) += 1;
        }

        stats.completed_total = completed.len();
        stats.completed_successful = completed
            .values()
            .filter(|entry| entry.outcome.is_success())
            .count();
        stats.completed_failed = stats.completed_total - stats.completed_successful;

        Ok(stats)
    }
}

impl<S: RetryScheduler + ?Sized> RetryScheduler for Arc<S> {
    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }

    fn policy(&self) -> &RetryPolicy {
        (**self).policy()
    }

    fn schedule(&self, job: RetryableJob) -> Result<ScheduleOutcome, RetryError> {
        (**self).schedule(job)
    }

    fn due_jobs(&self) -> Result<Vec<RetryableJob>, RetryError> {
        (**self).due_jobs()
    }

    fn scheduled_job(&self, job_id: JobId) -> Result<Option<RetryableJob>, RetryError> {
        (**self).scheduled_job(job_id)
    }

    fn complete(&self, job_id: JobId, result: Result<(), &str>) -> Result<Completion, RetryError> {
        (**self).complete(job_id, result)
    }

    fn cleanup(&self) -> Result<CleanupReport, RetryError> {
        (**self).cleanup()
    }

    fn stats(&self) -> Result<RetryStats, RetryError> {
        (**self).stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use eventrelay_core::{Clock, ManualClock};
    use eventrelay_events::{Event, EventKind, Payload};

    fn setup() -> (ManualClock, InMemoryRetryScheduler) {
        let clock = ManualClock::new();
        let scheduler = InMemoryRetryScheduler::new(RetryPolicy::default(), clock.shared());
        (clock, scheduler)
    }

    fn job(clock: &ManualClock) -> RetryableJob {
        let event = Event::new("sensor-1", EventKind::Warning, clock.now(), Payload::new());
        RetryableJob::new(event, "New event received", 3, clock.now())
    }

    #[test]
    fn scheduled_job_is_due_at_next_retry_time() {
        let (clock, scheduler) = setup();
        let job = job(&clock);
        let id = job.id();

        assert_eq!(scheduler.schedule(job).unwrap(), ScheduleOutcome::Scheduled);

        let due = scheduler.due_jobs().unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id(), id);
    }

    #[test]
    fn failure_reschedules_with_exponential_backoff() {
        let (clock, scheduler) = setup();
        let job = job(&clock);
        let id = job.id();
        scheduler.schedule(job).unwrap();

        let mut delays = Vec::new();
        for _ in 0..2 {
            let start = clock.now();
            let Completion::Rescheduled { next_retry_at } =
                scheduler.complete(id, Err("unavailable")).unwrap()
            else {
                panic!("expected reschedule");
            };
            delays.push((next_retry_at - start).to_std().unwrap());

            assert!(scheduler.due_jobs().unwrap().is_empty());
            clock.set(next_retry_at);
            assert_eq!(scheduler.due_jobs().unwrap().len(), 1);
        }

        assert_eq!(delays, vec![Duration::from_secs(1), Duration::from_secs(2)]);

        let third = RetryPolicy::default().delay_for_attempt(3);
        assert_eq!(third, Duration::from_secs(4));
    }

    #[test]
    fn rescheduled_job_records_error_and_attempt() {
        let (clock, scheduler) = setup();
        let job = job(&clock);
        let id = job.id();
        scheduler.schedule(job).unwrap();

        scheduler.complete(id, Err("timeout")).unwrap();

        let job = scheduler.scheduled_job(id).unwrap().unwrap();
        assert_eq!(job.attempt_count(), 1);
        assert_eq!(job.last_error(), Some("timeout"));
    }

    #[test]
    fn exhausted_job_is_completed_failed_and_never_due_again() {
        let (clock, scheduler) = setup();
        let job = job(&clock);
        let id = job.id();
        scheduler.schedule(job).unwrap();

        let mut last = Completion::Unknown;
        for _ in 0..3 {
            last = scheduler.complete(id, Err("down")).unwrap();
            clock.advance(Duration::from_secs(60));
        }

        assert_eq!(last, Completion::Exhausted);
        assert!(scheduler.due_jobs().unwrap().is_empty());

        let entry = scheduler.completed_job(id).unwrap().unwrap();
        assert_eq!(
            entry.outcome,
            JobOutcome::Failed {
                error: "down".to_string()
            }
        );
        assert_eq!(entry.job.attempt_count(), 3);

        let stats = scheduler.stats().unwrap();
        assert_eq!(stats.scheduled_total, 0);
        assert_eq!(stats.completed_failed, 1);
    }

    #[test]
    fn success_is_terminal_and_clears_error() {
        let (clock, scheduler) = setup();
        let job = job(&clock);
        let id = job.id();
        scheduler.schedule(job).unwrap();
        scheduler.complete(id, Err("flaky")).unwrap();
        clock.advance(Duration::from_secs(1));

        assert_eq!(scheduler.complete(id, Ok(())).unwrap(), Completion::Succeeded);

        assert!(scheduler.due_jobs().unwrap().is_empty());
        let entry = scheduler.completed_job(id).unwrap().unwrap();
        assert!(entry.outcome.is_success());
        assert!(entry.job.last_error().is_none());
    }

    #[test]
    fn completing_unknown_job_is_a_no_op() {
        let (_clock, scheduler) = setup();

        assert_eq!(
            scheduler.complete(JobId::new(), Ok(())).unwrap(),
            Completion::Unknown
        );
        assert_eq!(scheduler.stats().unwrap().completed_total, 0);
    }

    #[test]
    fn job_without_attempts_left_goes_straight_to_failed() {
        let (clock, scheduler) = setup();
        let event = Event::new("sensor-1", EventKind::Error, clock.now(), Payload::new());
        let job = RetryableJob::new(event, "msg", 0, clock.now());

        assert_eq!(scheduler.schedule(job).unwrap(), ScheduleOutcome::Exhausted);
        assert_eq!(scheduler.stats().unwrap().completed_failed, 1);
        assert!(scheduler.due_jobs().unwrap().is_empty());
    }

    #[test]
    fn disabled_scheduler_discards_jobs() {
        let clock = ManualClock::new();
        let scheduler = InMemoryRetryScheduler::disabled(clock.shared());

        assert_eq!(
            scheduler.schedule(job(&clock)).unwrap(),
            ScheduleOutcome::Discarded
        );
        assert!(scheduler.due_jobs().unwrap().is_empty());
        assert!(!scheduler.stats().unwrap().enabled);
    }

    #[test]
    fn cleanup_expires_old_jobs_and_prunes_history() {
        let (clock, scheduler) = setup();
        let old = job(&clock);
        let old_id = old.id();
        scheduler.schedule(old).unwrap();

        let done = job(&clock);
        let done_id = done.id();
        scheduler.schedule(done).unwrap();
        scheduler.complete(done_id, Ok(())).unwrap();

        clock.advance(Duration::from_secs(24 * 3600));
        let report = scheduler.cleanup().unwrap();

        assert_eq!(report, CleanupReport { expired: 1, pruned: 1 });
        assert!(scheduler.scheduled_job(old_id).unwrap().is_none());
        assert!(scheduler.completed_job(done_id).unwrap().is_none());
        assert!(!scheduler.completed_job(old_id).unwrap().unwrap().outcome.is_success());
    }

    #[test]
    fn cleanup_keeps_young_jobs() {
        let (clock, scheduler) = setup();
        scheduler.schedule(job(&clock)).unwrap();
        clock.advance(Duration::from_secs(3600));

        assert_eq!(scheduler.cleanup().unwrap(), CleanupReport::default());
        assert_eq!(scheduler.stats().unwrap().scheduled_total, 1);
    }

    #[test]
    fn stats_count_by_state_and_attempt() {
        let (clock, scheduler) = setup();

        let a = job(&clock);
        let b = job(&clock);
        let c = job(&clock);
        let (a_id, c_id) = (a.id(), c.id());
        scheduler.schedule(a).unwrap();
        scheduler.schedule(b).unwrap();
        scheduler.schedule(c).unwrap();

        scheduler.complete(a_id, Err("x")).unwrap();
        scheduler.complete(c_id, Ok(())).unwrap();

        let stats = scheduler.stats().unwrap();
        assert_eq!(stats.scheduled_total, 2);
        assert_eq!(
            stats.scheduled_by_attempt,
            BTreeMap::from([(1, 1), (2, 1), (3, 0)])
        );
        assert_eq!(stats.completed_total, 1);
        assert_eq!(stats.completed_successful, 1);
        assert_eq!(stats.completed_failed, 0);

        let map = stats.to_map();
        assert_eq!(map["scheduled_attempt_2"], 1);
        assert_eq!(map["completed_successful"], 1);
    }

    #[test]
    fn concurrent_schedule_and_complete() {
        let clock = ManualClock::new();
        let scheduler = InMemoryRetryScheduler::arc(RetryPolicy::default(), clock.shared());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let scheduler = scheduler.clone();
                let clock = clock.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let job = job(&clock);
                        let id = job.id();
                        scheduler.schedule(job).unwrap();
                        scheduler.complete(id, Ok(())).unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let stats = scheduler.stats().unwrap();
        assert_eq!(stats.scheduled_total, 0);
        assert_eq!(stats.completed_successful, 200);
    }

    #[test]
    fn stats_are_consistent_while_jobs_complete() {
        let clock = ManualClock::new();
        let scheduler = InMemoryRetryScheduler::arc(RetryPolicy::default(), clock.shared());
        let total = 5_000;

        let ids: Vec<JobId> = (0..total)
            .map(|_| {
                let job = job(&clock);
                let id = job.id();
                scheduler.schedule(job).unwrap();
                id
            })
            .collect();

        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let reader = {
            let scheduler = scheduler.clone();
            let done = done.clone();
            std::thread::spawn(move || {
                let mut inconsistent = 0;
                while !done.load(std::sync::atomic::Ordering::Acquire) {
                    let stats = scheduler.stats().unwrap();
                    if stats.scheduled_total + stats.completed_total != total {
                        inconsistent += 1;
                    }
                }
                inconsistent
            })
        };

        for (i, id) in ids.into_iter().enumerate() {
            let result = if i % 2 == 0 { Ok(()) } else { Err("down") };
            scheduler.complete(id, result).unwrap();
        }
        done.store(true, std::sync::atomic::Ordering::Release);

        assert_eq!(reader.join().unwrap(), 0);
        let stats = scheduler.stats().unwrap();
        assert_eq!(stats.scheduled_total + stats.completed_total, total);
        assert_eq!(stats.completed_successful, total / 2);
    }
}
