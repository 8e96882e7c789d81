//! Relay component wiring shared by the handlers and the binary.

use std::io;
use std::sync::Arc;

use eventrelay_core::SharedClock;
use eventrelay_infra::{
    Delivery, DeliveryOrchestrator, InMemoryDeduplicationCache, InMemoryRetryScheduler,
    RelayConfig, RelayWorkers, RetryDriver,
};

pub type SharedDelivery = Arc<dyn Delivery>;
pub type Cache = Arc<InMemoryDeduplicationCache>;
pub type Scheduler = Arc<InMemoryRetryScheduler>;
pub type Orchestrator = DeliveryOrchestrator<Cache, Scheduler, SharedDelivery>;
pub type Driver = RetryDriver<Scheduler, SharedDelivery>;

/// Everything the handlers need, built once at startup.
#[derive(Debug)]
pub struct AppServices {
    pub config: RelayConfig,
    pub cache: Cache,
    pub scheduler: Scheduler,
    pub orchestrator: Orchestrator,
    pub driver: Arc<Driver>,
}

impl AppServices {
    /// Start the cleanup and retry workers for these services.
    pub fn spawn_workers(&self) -> io::Result<RelayWorkers> {
        RelayWorkers::spawn(self.cache.clone(), self.driver.clone(), &self.config)
    }
}

pub fn build_services(config: RelayConfig, delivery: SharedDelivery, clock: SharedClock) -> AppServices {
    let cache = Arc::new(InMemoryDeduplicationCache::from_config(&config.dedup, clock.clone()));
    let scheduler = Arc::new(InMemoryRetryScheduler::from_config(&config.retry, clock.clone()));

    let orchestrator = DeliveryOrchestrator::new(cache.clone(), scheduler.clone(), delivery.clone(), clock);
    let driver = Arc::new(RetryDriver::new(scheduler.clone(), delivery));

    AppServices {
        config,
        cache,
        scheduler,
        orchestrator,
        driver,
    }
}
