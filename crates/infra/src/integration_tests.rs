//! Integration tests for the full relay pipeline.
//!
//! Tests: Event → DeduplicationCache → Delivery → RetryScheduler → RetryDriver
//!
//! Verifies:
//! - First-attempt success creates no retry job
//! - Failed deliveries are retried with backoff until success or exhaustion
//! - Duplicates within the TTL are never delivered or scheduled

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::json;

    use eventrelay_core::{Clock, ManualClock};
    use eventrelay_events::{fingerprint, Event, EventKind, Payload};

    use crate::config::RelayConfig;
    use crate::dedup::{DeduplicationCache, InMemoryDeduplicationCache};
    use crate::delivery::RecordingDelivery;
    use crate::orchestrator::{DeliveryOrchestrator, Submission};
    use crate::retry::{InMemoryRetryScheduler, RetryDriver, RetryScheduler};

    struct Relay {
        clock: ManualClock,
        cache: Arc<InMemoryDeduplicationCache>,
        scheduler: Arc<InMemoryRetryScheduler>,
        delivery: Arc<RecordingDelivery>,
        orchestrator: DeliveryOrchestrator<
            Arc<InMemoryDeduplicationCache>,
            Arc<InMemoryRetryScheduler>,
            Arc<RecordingDelivery>,
        >,
        driver: RetryDriver<Arc<InMemoryRetryScheduler>, Arc<RecordingDelivery>>,
    }

    fn relay(delivery: RecordingDelivery) -> Relay {
        relay_with(RelayConfig::default(), delivery)
    }

    fn relay_with(config: RelayConfig, delivery: RecordingDelivery) -> Relay {
        let clock = ManualClock::new();
        let cache = Arc::new(InMemoryDeduplicationCache::from_config(
            &config.dedup,
            clock.shared(),
        ));
        let scheduler = Arc::new(InMemoryRetryScheduler::from_config(
            &config.retry,
            clock.shared(),
        ));
        let delivery = Arc::new(delivery);

        let orchestrator = DeliveryOrchestrator::new(
            cache.clone(),
            scheduler.clone(),
            delivery.clone(),
            clock.shared(),
        );
        let driver = RetryDriver::new(scheduler.clone(), delivery.clone());

        Relay {
            clock,
            cache,
            scheduler,
            delivery,
            orchestrator,
            driver,
        }
    }

    fn sensor_event() -> Event {
        let mut payload = Payload::new();
        payload.insert("t".into(), json!(25.0));
        Event::new("sensor-1", EventKind::Warning, Utc::now(), payload)
    }

    #[test]
    fn first_attempt_success_creates_no_job() {
        let r = relay(RecordingDelivery::new());

        let result = r.orchestrator.process(&sensor_event());

        assert!(result.delivered());
        assert_eq!(r.scheduler.stats().unwrap().scheduled_total, 0);
        assert_eq!(r.delivery.attempts(), 1);
    }

    #[test]
    fn fail_fail_succeed_completes_after_three_drains() {
        let r = relay(RecordingDelivery::failing(2));

        let Submission::Failed {
            retry_job: Some(job_id),
        } = r.orchestrator.process(&sensor_event())
        else {
            panic!("first attempt should fail and schedule a retry");
        };

        for _ in 0..3 {
            r.driver.run_pass();
            r.clock.advance(Duration::from_secs(30));
        }

        let stats = r.scheduler.stats().unwrap();
        assert_eq!(stats.completed_successful, 1);
        assert_eq!(stats.scheduled_total, 0);
        assert!(r.scheduler.scheduled_job(job_id).unwrap().is_none());
        assert_eq!(r.delivery.attempts(), 3);
        assert_eq!(r.delivery.delivered().len(), 1);
    }

    #[test]
    fn exhausted_job_stops_being_retried() {
        let r = relay(RecordingDelivery::failing(100));

        r.orchestrator.process(&sensor_event());
        for _ in 0..6 {
            r.driver.run_pass();
            r.clock.advance(Duration::from_secs(30));
        }

        let stats = r.scheduler.stats().unwrap();
        assert_eq!(stats.completed_failed, 1);
        assert_eq!(stats.scheduled_total, 0);
        assert!(r.scheduler.due_jobs().unwrap().is_empty());
        // First attempt plus three retries.
        assert_eq!(r.delivery.attempts(), 4);
    }

    #[test]
    fn duplicate_within_ttl_is_not_delivered_or_scheduled() {
        let r = relay(RecordingDelivery::failing(1));

        r.orchestrator.process(&sensor_event());
        let attempts = r.delivery.attempts();
        let scheduled = r.scheduler.stats().unwrap().scheduled_total;

        r.clock.advance(Duration::from_secs(60));
        assert_eq!(r.orchestrator.process(&sensor_event()), Submission::Duplicate);

        assert_eq!(r.delivery.attempts(), attempts);
        assert_eq!(r.scheduler.stats().unwrap().scheduled_total, scheduled);
    }

    #[test]
    fn same_event_after_ttl_is_delivered_again() {
        let r = relay(RecordingDelivery::new());

        r.orchestrator.process(&sensor_event());
        r.clock.advance(Duration::from_secs(5 * 60));

        assert!(r.orchestrator.process(&sensor_event()).delivered());
        assert_eq!(r.delivery.delivered().len(), 2);
    }

    #[test]
    fn retry_delays_follow_backoff_law() {
        let mut config = RelayConfig::default();
        config.retry.max_attempts = 4;
        let r = relay_with(config, RecordingDelivery::failing(100));

        let Submission::Failed {
            retry_job: Some(job_id),
        } = r.orchestrator.process(&sensor_event())
        else {
            panic!("expected retry");
        };

        let mut delays = Vec::new();
        for _ in 0..3 {
            let before = r.clock.now();
            r.driver.run_pass();
            let job = r.scheduler.scheduled_job(job_id).unwrap().unwrap();
            delays.push((job.next_retry_at() - before).to_std().unwrap());
            r.clock.set(job.next_retry_at());
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[test]
    fn cache_stays_within_capacity() {
        let mut config = RelayConfig::default();
        config.dedup.max_cache_size = 10;
        let r = relay_with(config, RecordingDelivery::new());

        for i in 0..50 {
            let mut payload = Payload::new();
            payload.insert("seq".into(), json!(i));
            r.orchestrator
                .process(&Event::new("sensor-1", EventKind::Info, Utc::now(), payload));
        }
        r.cache.cleanup();

        assert!(r.cache.size() <= 10);
        assert_eq!(r.delivery.delivered().len(), 50);
    }

    #[test]
    fn disabled_dedup_delivers_every_submission() {
        let mut config = RelayConfig::default();
        config.dedup.enabled = false;
        let r = relay_with(config, RecordingDelivery::new());

        r.orchestrator.process(&sensor_event());
        r.orchestrator.process(&sensor_event());

        assert_eq!(r.delivery.delivered().len(), 2);
        assert_eq!(r.cache.size(), 0);
    }

    #[test]
    fn manual_retry_delivers_a_job_that_is_not_yet_due() {
        let r = relay(RecordingDelivery::failing(2));

        let Submission::Failed {
            retry_job: Some(job_id),
        } = r.orchestrator.process(&sensor_event())
        else {
            panic!("expected retry");
        };
        r.driver.run_pass();
        assert!(r.scheduler.due_jobs().unwrap().is_empty());

        r.driver.retry_job(job_id).unwrap();

        assert_eq!(r.scheduler.stats().unwrap().completed_successful, 1);
    }

    #[test]
    fn fingerprints_do_not_collide_across_a_corpus() {
        let kinds = [
            EventKind::UserAction,
            EventKind::SystemEvent,
            EventKind::Error,
            EventKind::Warning,
            EventKind::Info,
        ];
        let now = Utc::now();
        let mut digests = HashSet::new();
        let mut count = 0;

        for source in ["sensor-1", "sensor-2", "sensor-10", "gateway"] {
            for kind in kinds {
                for value in [json!(25.0), json!(25.5), json!("25"), json!(null), json!([25])] {
                    let mut payload = Payload::new();
                    payload.insert("t".into(), value);
                    let event = Event::new(source, kind, now, payload);
                    digests.insert(fingerprint(&event, now).digest().clone());
                    count += 1;
                }
            }
        }

        assert_eq!(digests.len(), count);
    }
}
