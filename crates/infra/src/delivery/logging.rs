use tracing::info;

use super::{Delivery, DeliveryError};

/// Development transport: writes each notification to the log and accepts it.
#[derive(Debug, Clone)]
pub struct TracingDelivery {
    channel: String,
}

impl TracingDelivery {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Default for TracingDelivery {
    fn default() -> Self {
        Self::new("notifications")
    }
}

impl Delivery for TracingDelivery {
    fn deliver(&self, message: &str) -> Result<(), DeliveryError> {
        info!(channel = %self.channel, bytes = message.len(), message = %message, "notification published");
        Ok(())
    }
}
