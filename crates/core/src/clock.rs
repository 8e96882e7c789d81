//! Clock abstraction.
//!
//! TTL expiry and retry backoff are both functions of "now". Components take a
//! [`SharedClock`] so production code reads the system clock while tests drive
//! time forward explicitly with [`ManualClock`].

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of wall-clock time.
pub trait Clock: Send + Sync + core::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock handle shared between components.
pub type SharedClock = Arc<dyn Clock>;

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests.
///
/// Clones share the same underlying instant, so a test can hand one clone to
/// the component under test and advance the other.
#[derive(Debug, Clone)]
pub struct ManualClock {
    nanos: Arc<AtomicI64>,
}

impl ManualClock {
    /// Start at the current system time.
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Start at a fixed instant.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            nanos: Arc::new(AtomicI64::new(start.timestamp_nanos_opt().unwrap_or(0))),
        }
    }

    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let delta = i64::try_from(by.as_nanos()).unwrap_or(i64::MAX);
        self.nanos.fetch_add(delta, Ordering::AcqRel);
    }

    /// Jump to an absolute instant (may move backwards).
    pub fn set(&self, to: DateTime<Utc>) {
        self.nanos
            .store(to.timestamp_nanos_opt().unwrap_or(0), Ordering::Release);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_nanos(self.nanos.load(Ordering::Acquire))
    }
}
