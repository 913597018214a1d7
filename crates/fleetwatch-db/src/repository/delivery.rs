//! SurrealDB implementation of [`DeliveryRepository`].
//!
//! A delivery's record id is derived from `(event, recipient, channel)`,
//! so recording the same delivery twice collides instead of duplicating.
//! Status changes are conditional on the row still being `Pending`.

use chrono::{DateTime, Duration, Utc};
use fleetwatch_core::error::FleetResult;
use fleetwatch_core::models::delivery::{Delivery, DeliveryStatus, NewDelivery, PendingRecord};
use fleetwatch_core::repository::DeliveryRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::recipient::{channel_to_str, parse_channel};
use super::row::{IdRow, parse_uuid, unknown};
use crate::error::DbError;

const DELIVERY_FIELDS: &str = "meta::id(id) AS record_id, event_id, recipient_id, tenant_id, \
     channel, destination, subject, message, status, error_detail, sent_at, \
     created_at, updated_at";

fn parse_status(s: &str) -> Result<DeliveryStatus, DbError> {
    match s {
        "Pending" => Ok(DeliveryStatus::Pending),
        "Sent" => Ok(DeliveryStatus::Sent),
        "Failed" => Ok(DeliveryStatus::Failed),
        "Skipped" => Ok(DeliveryStatus::Skipped),
        other => Err(unknown("delivery status", other)),
    }
}

#[derive(Debug, SurrealValue)]
struct DeliveryRow {
    record_id: String,
    event_id: String,
    recipient_id: String,
    tenant_id: String,
    channel: String,
    destination: String,
    subject: String,
    message: String,
    status: String,
    error_detail: Option<String>,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DeliveryRow {
    fn try_into_delivery(self) -> Result<Delivery, DbError> {
        Ok(Delivery {
            id: parse_uuid("delivery", &self.record_id)?,
            event_id: parse_uuid("event", &self.event_id)?,
            recipient_id: parse_uuid("recipient", &self.recipient_id)?,
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            channel: parse_channel(&self.channel)?,
            destination: self.destination,
            subject: self.subject,
            message: self.message,
            status: parse_status(&self.status)?,
            error_detail: self.error_detail,
            sent_at: self.sent_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the delivery log.
#[derive(Clone)]
pub struct SurrealDeliveryRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealDeliveryRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn find(&self, id: Uuid) -> Result<Option<Delivery>, DbError> {
        let mut result = self
            .db
            .query(format!(
                "SELECT {DELIVERY_FIELDS} FROM type::record('delivery', $id)"
            ))
            .bind(("id", id.to_string()))
            .await?;
        let rows: Vec<DeliveryRow> = result.take(0)?;
        rows.into_iter()
            .next()
            .map(DeliveryRow::try_into_delivery)
            .transpose()
    }

    /// Take over a pending delivery whose last touch predates `cutoff`.
    /// Only one caller can win, because the touch moves `updated_at`
    /// past the cutoff.
    async fn take_over_stale(
        &self,
        id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Delivery>, DbError> {
        let response = self
            .db
            .query(format!(
                "UPDATE type::record('delivery', $id) SET updated_at = time::now() \
                 WHERE status = 'Pending' AND updated_at < $cutoff \
                 RETURN {DELIVERY_FIELDS}"
            ))
            .bind(("id", id.to_string()))
            .bind(("cutoff", cutoff))
            .await?;
        let mut result = response
            .check()
            .map_err(|e| DbError::from_statement("delivery", e))?;
        let rows: Vec<DeliveryRow> = result.take(0)?;
        rows.into_iter()
            .next()
            .map(DeliveryRow::try_into_delivery)
            .transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        status: &'static str,
        sent_at: Option<DateTime<Utc>>,
        detail: Option<String>,
    ) -> FleetResult<bool> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('delivery', $id) SET \
                 status = $status, sent_at = $sent_at, error_detail = $detail, \
                 updated_at = time::now() \
                 WHERE status = 'Pending' RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id.to_string()))
            .bind(("status", status.to_string()))
            .bind(("sent_at", sent_at))
            .bind(("detail", detail))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            debug!(delivery_id = %id, status, "Delivery no longer pending, transition ignored");
        }
        Ok(!rows.is_empty())
    }
}

impl<C: Connection> DeliveryRepository for SurrealDeliveryRepository<C> {
    async fn record_pending(
        &self,
        input: NewDelivery,
        pending_timeout: Duration,
    ) -> FleetResult<PendingRecord> {
        let id = input.id();

        let response = self
            .db
            .query(format!(
                "CREATE type::record('delivery', $id) SET \
                 event_id = $event_id, recipient_id = $recipient_id, \
                 tenant_id = $tenant_id, channel = $channel, \
                 destination = $destination, subject = $subject, \
                 message = $message, status = 'Pending' \
                 RETURN {DELIVERY_FIELDS}"
            ))
            .bind(("id", id.to_string()))
            .bind(("event_id", input.event_id.to_string()))
            .bind(("recipient_id", input.recipient_id.to_string()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("channel", channel_to_str(input.channel).to_string()))
            .bind(("destination", input.destination))
            .bind(("subject", input.subject))
            .bind(("message", input.message))
            .await
            .map_err(DbError::from)?;

        let create_error = match response.check() {
            Ok(mut result) => {
                let rows: Vec<DeliveryRow> = result.take(0).map_err(DbError::from)?;
                let row = rows
                    .into_iter()
                    .next()
                    .ok_or_else(|| DbError::not_found("delivery", id))?;
                return Ok(PendingRecord::Created(row.try_into_delivery()?));
            }
            Err(e) => e,
        };

        let Some(existing) = self.find(id).await? else {
            return Err(DbError::from_statement("delivery", create_error).into());
        };
        if existing.status.is_terminal() {
            return Ok(PendingRecord::AlreadyTerminal(existing));
        }

        let cutoff = Utc::now() - pending_timeout;
        if existing.updated_at < cutoff
            && let Some(taken) = self.take_over_stale(id, cutoff).await?
        {
            return Ok(PendingRecord::Retryable(taken));
        }

        // Lost the take-over or still fresh; report whatever is stored now.
        let current = self
            .find(id)
            .await?
            .ok_or_else(|| DbError::not_found("delivery", id))?;
        Ok(if current.status.is_terminal() {
            PendingRecord::AlreadyTerminal(current)
        } else {
            PendingRecord::StillPending(current)
        })
    }

    async fn get_by_id(&self, id: Uuid) -> FleetResult<Delivery> {
        Ok(self
            .find(id)
            .await?
            .ok_or_else(|| DbError::not_found("delivery", id))?)
    }

    async fn mark_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> FleetResult<bool> {
        self.transition(id, "Sent", Some(sent_at), None).await
    }

    async fn mark_failed(&self, id: Uuid, detail: String) -> FleetResult<bool> {
        self.transition(id, "Failed", None, Some(detail)).await
    }

    async fn mark_skipped(&self, id: Uuid, reason: String) -> FleetResult<bool> {
        self.transition(id, "Skipped", None, Some(reason)).await
    }

    async fn list_for_event(&self, event_id: Uuid) -> FleetResult<Vec<Delivery>> {
        let mut result = self
            .db
            .query(format!(
                "SELECT {DELIVERY_FIELDS} FROM delivery \
                 WHERE event_id = $event_id ORDER BY created_at ASC"
            ))
            .bind(("event_id", event_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<DeliveryRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(DeliveryRow::try_into_delivery)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
