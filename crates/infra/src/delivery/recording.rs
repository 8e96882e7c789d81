use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{Delivery, DeliveryError};

/// In-memory transport with scripted outcomes.
///
/// Each call pops the next scripted result; once the script runs out every
/// call succeeds. Accepted messages are kept for inspection.
#[derive(Debug, Default)]
pub struct RecordingDelivery {
    script: Mutex<VecDeque<Result<(), DeliveryError>>>,
    delivered: Mutex<Vec<String>>,
    attempts: AtomicUsize,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcomes to return, in order, before falling back to success.
    pub fn scripted(outcomes: impl IntoIterator<Item = Result<(), DeliveryError>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Fail the next `n` calls with [`DeliveryError::Unavailable`].
    pub fn failing(n: usize) -> Self {
        Self::scripted(
            (0..n).map(|i| Err(DeliveryError::Unavailable(format!("scripted failure {}", i + 1)))),
        )
    }

    pub fn push(&self, outcome: Result<(), DeliveryError>) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }

    /// Number of `deliver` calls so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Messages that were accepted.
    pub fn delivered(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Delivery for RecordingDelivery {
    fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let outcome = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Ok(()));

        if outcome.is_ok() {
            self.delivered
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message.to_string());
        }
        outcome
    }
}
