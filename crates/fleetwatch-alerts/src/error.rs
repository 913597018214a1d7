//! Alerting error types.

use fleetwatch_core::error::FleetError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("dispatch queue is full")]
    QueueFull,

    #[error("dispatcher has shut down")]
    DispatcherClosed,

    #[error("tenant {0} does not exist")]
    UnknownTenant(Uuid),

    #[error("geofence {0} is tenant-owned; only platform geofences can be shared")]
    TenantOwnedShare(Uuid),
}

impl From<AlertError> for FleetError {
    fn from(err: AlertError) -> Self {
        match err {
            AlertError::QueueFull => FleetError::QueueFull,
            AlertError::DispatcherClosed => FleetError::Internal(err.to_string()),
            AlertError::UnknownTenant(id) => FleetError::not_found("tenant", id),
            AlertError::TenantOwnedShare(_) => FleetError::validation(err.to_string()),
        }
    }
}
