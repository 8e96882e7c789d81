//! Notification delivery capability.
//!
//! The relay never talks to a transport directly. It hands the rendered message
//! to a [`Delivery`] implementation, which owns its own timeouts. Ordinary
//! failures come back as [`DeliveryError`]; a panic is treated as a bug and
//! contained by the retry driver.

pub mod logging;
pub mod recording;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

pub use logging::TracingDelivery;
pub use recording::RecordingDelivery;

/// Delivery error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery rejected: {0}")]
    Rejected(String),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Sends one notification message to the external channel.
pub trait Delivery: Send + Sync + core::fmt::Debug {
    fn deliver(&self, message: &str) -> Result<(), DeliveryError>;
}

impl<D: Delivery + ?Sized> Delivery for Arc<D> {
    fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        (**self).deliver(message)
    }
}

/// Attempt one delivery, turning both errors and panics into a failure reason.
pub(crate) fn deliver_isolated<D: Delivery + ?Sized>(delivery: &D, message: &str) -> Result<(), String> {
    match panic::catch_unwind(AssertUnwindSafe(|| delivery.deliver(message))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            error!(panic = %reason, "delivery panicked");
            Err(format!("delivery panicked: {reason}"))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
