//! Relay infrastructure: duplicate suppression, delivery, retries and workers.

pub mod config;
pub mod dedup;
pub mod delivery;
pub mod orchestrator;
pub mod retry;
pub mod workers;

mod integration_tests;

pub use config::{ConfigError, RelayConfig};
pub use dedup::{DeduplicationCache, InMemoryDeduplicationCache};
pub use delivery::{Delivery, DeliveryError, RecordingDelivery, TracingDelivery};
pub use orchestrator::{DeliveryOrchestrator, Submission};
pub use retry::{InMemoryRetryScheduler, RetryDriver, RetryError, RetryScheduler, RetryStats};
pub use workers::{PeriodicWorker, RelayWorkers, WorkerHandle};
