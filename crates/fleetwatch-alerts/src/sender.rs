//! The external notification sender seam.
//!
//! Real transports (SMTP, messaging gateways) live outside this crate and
//! plug in by implementing [`NotificationSender`].

use fleetwatch_core::models::recipient::Channel;
use thiserror::Error;
use tracing::info;

/// A transport-level failure, recorded verbatim on the delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail}")]
pub struct SendError {
    pub detail: String,
}

impl SendError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

pub trait NotificationSender: Send + Sync + 'static {
    /// Whether this sender implements `channel`. Deliveries on
    /// unsupported channels are recorded skipped.
    fn supports(&self, _channel: Channel) -> bool {
        true
    }

    fn send(
        &self,
        channel: Channel,
        destination: &str,
        subject: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), SendError>> + Send;
}

/// Development sender that acknowledges every message by logging it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSender;

impl NotificationSender for LogSender {
    async fn send(
        &self,
        channel: Channel,
        destination: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), SendError> {
        info!(%channel, destination, subject, body, "Notification sent");
        Ok(())
    }
}
