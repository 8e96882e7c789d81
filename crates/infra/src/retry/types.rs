//! Retry job values and backoff policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventrelay_core::JobId;
use eventrelay_events::Event;

use crate::config::RetryConfig;

/// Exponential backoff policy.
///
/// The delay before the Nth retry is `base_delay * multiplier^(N-1)`, capped at
/// `max_age` (a job older than `max_age` is dropped anyway).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts allowed after the first delivery failed.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    /// Absolute age ceiling for scheduled jobs and completed history.
    pub max_age: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_age: Duration::from_secs(24 * 3600),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.initial_delay(),
            multiplier: config.backoff_multiplier,
            max_age: config.max_age(),
        }
    }

    /// Calculate delay for a given retry number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exp = self.multiplier.powi((attempt - 1).min(i32::MAX as u32) as i32);
        let secs = self.base_delay.as_secs_f64() * exp;
        let max = self.max_age.as_secs_f64();

        if !secs.is_finite() || secs >= max {
            return self.max_age;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    pub(crate) fn max_age_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.max_age).unwrap_or(chrono::Duration::MAX)
    }
}

/// One notification's retry lineage.
///
/// Values are immutable: every transition returns a new job that replaces the
/// previous one by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryableJob {
    id: JobId,
    event: Event,
    message: String,
    attempt_count: u32,
    max_attempts: u32,
    next_retry_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    last_error: Option<String>,
}

impl RetryableJob {
    /// A fresh job, due immediately.
    pub fn new(
        event: Event,
        message: impl Into<String>,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            event,
            message: message.into(),
            attempt_count: 0,
            max_attempts,
            next_retry_at: now,
            created_at: now,
            last_error: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn next_retry_at(&self) -> DateTime<Utc> {
        self.next_retry_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at <= now
    }

    pub fn is_expired(&self, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at >= max_age
    }

    /// True when a failure of the attempt in flight uses up the last attempt.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt_count.saturating_add(1) >= self.max_attempts
    }

    pub fn has_exhausted_attempts(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }

    /// The job after one more failed attempt, due again after `delay`.
    pub fn rescheduled(self, error: impl Into<String>, delay: Duration, now: DateTime<Utc>) -> Self {
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        Self {
            attempt_count: self.attempt_count.saturating_add(1),
            next_retry_at: now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC),
            last_error: Some(error.into()),
            ..self
        }
    }

    /// The job as it stands after a final failure.
    pub fn failed(self, error: impl Into<String>) -> Self {
        Self {
            attempt_count: self.attempt_count.saturating_add(1),
            last_error: Some(error.into()),
            ..self
        }
    }

    /// The job as it stands after a successful attempt.
    pub fn succeeded(self) -> Self {
        Self {
            attempt_count: self.attempt_count.saturating_add(1),
            last_error: None,
            ..self
        }
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum JobOutcome {
    Succeeded,
    Failed { error: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded)
    }
}

/// A job in the completed history, kept for stats until it ages out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedJob {
    pub job: RetryableJob,
    pub outcome: JobOutcome,
    pub completed_at: DateTime<Utc>,
}

/// What `schedule` did with a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Retry is disabled; the job was dropped.
    Discarded,
    Scheduled,
    /// The job had no attempts left and went straight to completed-failed.
    Exhausted,
}

/// What `complete` did with a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// No scheduled job had that id.
    Unknown,
    Succeeded,
    Rescheduled { next_retry_at: DateTime<Utc> },
    Exhausted,
}
