//! Delivery domain model.
//!
//! One delivery tracks one attempt to notify one recipient on one channel
//! for one event. `Pending` is the only non-terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::recipient::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
    Skipped,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryStatus::Pending)
    }
}

/// Namespace for delivery ids derived from `(event, recipient, channel)`.
const DELIVERY_ID_NAMESPACE: Uuid = Uuid::from_u128(0x0c5a_77e9_41d2_4b8b_9f6e_d2a0_13f4_a6c8);

/// Deterministic delivery id, so a re-dispatch after a crash lands on the
/// same row.
pub fn delivery_id(event_id: Uuid, recipient_id: Uuid, channel: Channel) -> Uuid {
    let mut name = Vec::with_capacity(40);
    name.extend_from_slice(event_id.as_bytes());
    name.extend_from_slice(recipient_id.as_bytes());
    name.extend_from_slice(channel.as_str().as_bytes());
    Uuid::new_v5(&DELIVERY_ID_NAMESPACE, &name)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Uuid,
    pub event_id: Uuid,
    pub recipient_id: Uuid,
    pub tenant_id: Uuid,
    pub channel: Channel,
    pub destination: String,
    pub subject: String,
    pub message: String,
    pub status: DeliveryStatus,
    /// Sender error or skip reason, verbatim.
    pub error_detail: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to record a pending delivery.
#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub event_id: Uuid,
    pub recipient_id: Uuid,
    pub tenant_id: Uuid,
    pub channel: Channel,
    pub destination: String,
    pub subject: String,
    pub message: String,
}

impl NewDelivery {
    pub fn id(&self) -> Uuid {
        delivery_id(self.event_id, self.recipient_id, self.channel)
    }
}

/// Result of recording a pending delivery.
#[derive(Debug, Clone)]
pub enum PendingRecord {
    /// Fresh row; the caller owns the send.
    Created(Delivery),
    /// A previous attempt already reached a terminal status.
    AlreadyTerminal(Delivery),
    /// A previous attempt is pending and still within its timeout.
    StillPending(Delivery),
    /// A previous attempt is pending past its timeout and may be re-sent.
    Retryable(Delivery),
}

impl PendingRecord {
    pub fn should_send(&self) -> bool {
        matches!(self, PendingRecord::Created(_) | PendingRecord::Retryable(_))
    }

    pub fn delivery(&self) -> &Delivery {
        match self {
            PendingRecord::Created(d)
            | PendingRecord::AlreadyTerminal(d)
            | PendingRecord::StillPending(d)
            | PendingRecord::Retryable(d) => d,
        }
    }

    pub fn into_delivery(self) -> Delivery {
        match self {
            PendingRecord::Created(d)
            | PendingRecord::AlreadyTerminal(d)
            | PendingRecord::StillPending(d)
            | PendingRecord::Retryable(d) => d,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(DeliveryStatus::Sent.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(DeliveryStatus::Skipped.is_terminal());
    }

    #[test]
    fn delivery_id_depends_on_all_parts() {
        let e = Uuid::from_u128(1);
        let r = Uuid::from_u128(2);
        let id = delivery_id(e, r, Channel::Email);
        assert_eq!(id, delivery_id(e, r, Channel::Email));
        assert_ne!(id, delivery_id(e, r, Channel::Messaging));
        assert_ne!(id, delivery_id(r, e, Channel::Email));
    }
}
