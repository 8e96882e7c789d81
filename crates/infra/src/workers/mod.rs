//! Background workers for periodic maintenance.
//!
//! Each worker is a thread with its own timer:
//!
//! - `dedup-cleanup`: sweeps expired fingerprints
//! - `retry-cleanup`: expires old jobs and prunes completed history
//! - `retry-driver`: drains due retry jobs

pub mod periodic;

use std::io;
use std::sync::Arc;

use tracing::{error, info};

use crate::config::RelayConfig;
use crate::dedup::DeduplicationCache;
use crate::delivery::Delivery;
use crate::retry::{RetryDriver, RetryScheduler};

pub use periodic::{PeriodicWorker, WorkerHandle};

/// The running set of relay maintenance workers.
#[derive(Debug, Default)]
pub struct RelayWorkers {
    handles: Vec<WorkerHandle>,
}

impl RelayWorkers {
    /// Spawn the workers that apply to the enabled components.
    pub fn spawn<C, S, D>(
        cache: C,
        driver: Arc<RetryDriver<S, D>>,
        config: &RelayConfig,
    ) -> io::Result<Self>
    where
        C: DeduplicationCache + 'static,
        S: RetryScheduler + 'static,
        D: Delivery + 'static,
    {
        let mut workers = Self::default();

        if cache.is_enabled() {
            workers.push(PeriodicWorker::spawn(
                "dedup-cleanup",
                config.dedup.cleanup_interval(),
                move || {
                    cache.cleanup();
                },
            ))?;
        }

        if driver.scheduler().is_enabled() {
            let cleanup_driver = driver.clone();
            workers.push(PeriodicWorker::spawn(
                "retry-cleanup",
                config.retry.cleanup_interval(),
                move || {
                    if let Err(err) = cleanup_driver.scheduler().cleanup() {
                        error!(error = %err, "retry cleanup failed");
                    }
                },
            ))?;

            workers.push(PeriodicWorker::spawn(
                "retry-driver",
                config.retry.driver_interval(),
                move || {
                    driver.run_pass();
                },
            ))?;
        }

        info!(workers = ?workers.names(), "relay workers started");
        Ok(workers)
    }

    fn push(&mut self, handle: io::Result<WorkerHandle>) -> io::Result<()> {
        match handle {
            Ok(handle) => {
                self.handles.push(handle);
                Ok(())
            }
            Err(err) => {
                let started = std::mem::take(&mut self.handles);
                for h in started {
                    h.shutdown();
                }
                Err(err)
            }
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handles.iter().map(WorkerHandle::name).collect()
    }

    /// Stop every worker and wait for them to exit.
    pub fn shutdown(self) {
        for handle in self.handles {
            let name = handle.name();
            handle.shutdown();
            info!(worker = name, "worker shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use eventrelay_core::{Clock, ManualClock};

    use crate::config::{DedupConfig, RetryConfig};
    use crate::dedup::InMemoryDeduplicationCache;
    use crate::delivery::RecordingDelivery;
    use crate::retry::{InMemoryRetryScheduler, RetryPolicy};

    #[test]
    fn spawns_only_enabled_workers() {
        let clock = ManualClock::new();
        let config = RelayConfig {
            dedup: DedupConfig {
                enabled: false,
                ..Default::default()
            },
            retry: RetryConfig::default(),
            ..Default::default()
        };

        let cache = Arc::new(InMemoryDeduplicationCache::from_config(&config.dedup, clock.shared()));
        let driver = Arc::new(RetryDriver::new(
            InMemoryRetryScheduler::arc(RetryPolicy::default(), clock.shared()),
            RecordingDelivery::new(),
        ));

        let workers = RelayWorkers::spawn(cache, driver, &config).unwrap();
        assert_eq!(workers.names(), vec!["retry-cleanup", "retry-driver"]);
        workers.shutdown();
    }

    #[test]
    fn driver_worker_drains_due_jobs() {
        use eventrelay_events::{Event, EventKind, Payload};
        use crate::retry::RetryableJob;

        let clock = ManualClock::new();
        let config = RelayConfig {
            retry: RetryConfig {
                driver_interval_seconds: 0,
                ..Default::default()
            },
            ..Default::default()
        };

        let scheduler = InMemoryRetryScheduler::arc(RetryPolicy::default(), clock.shared());
        let event = Event::new("sensor-1", EventKind::Info, clock.now(), Payload::new());
        scheduler
            .schedule(RetryableJob::new(event, "msg", 3, clock.now()))
            .unwrap();

        let driver = Arc::new(RetryDriver::new(scheduler.clone(), RecordingDelivery::new()));
        let cache = Arc::new(InMemoryDeduplicationCache::new(
            Duration::from_secs(60),
            10,
            clock.shared(),
        ));
        let workers = RelayWorkers::spawn(cache, driver, &config).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while scheduler.stats().unwrap().completed_successful == 0
            && std::time::Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(5));
        }
        workers.shutdown();

        assert_eq!(scheduler.stats().unwrap().completed_successful, 1);
    }
}
