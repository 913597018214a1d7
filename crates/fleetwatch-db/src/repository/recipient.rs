//! SurrealDB implementation of [`RecipientRepository`].

use chrono::{DateTime, Utc};
use fleetwatch_core::error::FleetResult;
use fleetwatch_core::matching::Entitlement;
use fleetwatch_core::models::event::Direction;
use fleetwatch_core::models::recipient::{Channel, CreateRecipient, Recipient, UpdateRecipient};
use fleetwatch_core::repository::{PaginatedResult, Pagination, RecipientRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::event::{direction_to_str, parse_direction};
use super::row::{CountRow, parse_uuid, parse_uuids, unknown, uuid_strings};
use crate::error::DbError;

const RECIPIENT_FIELDS: &str = "meta::id(id) AS record_id, tenant_id, name, email, \
     messaging_address, channels, alert_types, geofence_ids, vehicle_ids, active, \
     created_at, updated_at";

pub(crate) fn channel_to_str(channel: Channel) -> &'static str {
    match channel {
        Channel::Email => "Email",
        Channel::Messaging => "Messaging",
    }
}

pub(crate) fn parse_channel(s: &str) -> Result<Channel, DbError> {
    match s {
        "Email" => Ok(Channel::Email),
        "Messaging" => Ok(Channel::Messaging),
        other => Err(unknown("channel", other)),
    }
}

fn channel_strings(channels: &[Channel]) -> Vec<String> {
    channels.iter().map(|c| channel_to_str(*c).to_string()).collect()
}

fn direction_strings(directions: &[Direction]) -> Vec<String> {
    directions
        .iter()
        .map(|d| direction_to_str(*d).to_string())
        .collect()
}

#[derive(Debug, SurrealValue)]
struct RecipientRow {
    record_id: String,
    tenant_id: String,
    name: String,
    email: Option<String>,
    messaging_address: Option<String>,
    channels: Vec<String>,
    alert_types: Vec<String>,
    geofence_ids: Option<Vec<String>>,
    vehicle_ids: Option<Vec<String>>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RecipientRow {
    fn try_into_recipient(self) -> Result<Recipient, DbError> {
        Ok(Recipient {
            id: parse_uuid("recipient", &self.record_id)?,
            tenant_id: parse_uuid("tenant", &self.tenant_id)?,
            name: self.name,
            email: self.email,
            messaging_address: self.messaging_address,
            channels: self
                .channels
                .iter()
                .map(|c| parse_channel(c))
                .collect::<Result<_, _>>()?,
            alert_types: self
                .alert_types
                .iter()
                .map(|d| parse_direction(d))
                .collect::<Result<_, _>>()?,
            geofence_ids: self
                .geofence_ids
                .map(|ids| parse_uuids("geofence", ids))
                .transpose()?,
            vehicle_ids: self
                .vehicle_ids
                .map(|ids| parse_uuids("vehicle", ids))
                .transpose()?,
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the recipient store.
#[derive(Clone)]
pub struct SurrealRecipientRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealRecipientRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> RecipientRepository for SurrealRecipientRepository<C> {
    async fn create(&self, input: CreateRecipient) -> FleetResult<Recipient> {
        let id = Uuid::new_v4();

        let result = self
            .db
            .query(format!(
                "CREATE type::record('recipient', $id) SET \
                 tenant_id = $tenant_id, name = $name, email = $email, \
                 messaging_address = $messaging_address, channels = $channels, \
                 alert_types = $alert_types, geofence_ids = $geofence_ids, \
                 vehicle_ids = $vehicle_ids, active = true \
                 RETURN {RECIPIENT_FIELDS}"
            ))
            .bind(("id", id.to_string()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("name", input.name))
            .bind(("email", input.email))
            .bind(("messaging_address", input.messaging_address))
            .bind(("channels", channel_strings(&input.channels)))
            .bind(("alert_types", direction_strings(&input.alert_types)))
            .bind(("geofence_ids", input.geofence_ids.as_deref().map(uuid_strings)))
            .bind(("vehicle_ids", input.vehicle_ids.as_deref().map(uuid_strings)))
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("recipient", e))?;

        let rows: Vec<RecipientRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("recipient", id))?;
        Ok(row.try_into_recipient()?)
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> FleetResult<Recipient> {
        let mut result = self
            .db
            .query(format!(
                "SELECT {RECIPIENT_FIELDS} FROM type::record('recipient', $id) \
                 WHERE tenant_id = $tenant_id"
            ))
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RecipientRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("recipient", id))?;
        Ok(row.try_into_recipient()?)
    }

    async fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateRecipient,
    ) -> FleetResult<Recipient> {
        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.email.is_some() {
            sets.push("email = $email");
        }
        if input.messaging_address.is_some() {
            sets.push("messaging_address = $messaging_address");
        }
        if input.channels.is_some() {
            sets.push("channels = $channels");
        }
        if input.alert_types.is_some() {
            sets.push("alert_types = $alert_types");
        }
        if input.geofence_ids.is_some() {
            sets.push("geofence_ids = $geofence_ids");
        }
        if input.vehicle_ids.is_some() {
            sets.push("vehicle_ids = $vehicle_ids");
        }
        if input.active.is_some() {
            sets.push("active = $active");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('recipient', $id) SET {} \
             WHERE tenant_id = $tenant_id RETURN {RECIPIENT_FIELDS}",
            sets.join(", ")
        );
        let mut builder = self
            .db
            .query(query)
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        // Nested options: Some(None) clears the field.
        if let Some(email) = input.email {
            builder = builder.bind(("email", email));
        }
        if let Some(messaging_address) = input.messaging_address {
            builder = builder.bind(("messaging_address", messaging_address));
        }
        if let Some(ref channels) = input.channels {
            builder = builder.bind(("channels", channel_strings(channels)));
        }
        if let Some(ref alert_types) = input.alert_types {
            builder = builder.bind(("alert_types", direction_strings(alert_types)));
        }
        if let Some(ref geofence_ids) = input.geofence_ids {
            builder = builder.bind(("geofence_ids", geofence_ids.as_deref().map(uuid_strings)));
        }
        if let Some(ref vehicle_ids) = input.vehicle_ids {
            builder = builder.bind(("vehicle_ids", vehicle_ids.as_deref().map(uuid_strings)));
        }
        if let Some(active) = input.active {
            builder = builder.bind(("active", active));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("recipient", e))?;

        let rows: Vec<RecipientRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("recipient", id))?;
        Ok(row.try_into_recipient()?)
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> FleetResult<()> {
        let mut result = self
            .db
            .query(
                "DELETE type::record('recipient', $id) WHERE tenant_id = $tenant_id \
                 RETURN BEFORE",
            )
            .bind(("id", id.to_string()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<surrealdb_types::Value> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::not_found("recipient", id).into());
        }
        Ok(())
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> FleetResult<PaginatedResult<Recipient>> {
        let tenant_id_str = tenant_id.to_string();

        let mut count_result = self
            .db
            .query(
                "SELECT count() AS total FROM recipient \
                 WHERE tenant_id = $tenant_id GROUP ALL",
            )
            .bind(("tenant_id", tenant_id_str.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let mut result = self
            .db
            .query(format!(
                "SELECT {RECIPIENT_FIELDS} FROM recipient \
                 WHERE tenant_id = $tenant_id \
                 ORDER BY created_at ASC LIMIT $limit START $offset"
            ))
            .bind(("tenant_id", tenant_id_str))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RecipientRow> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(RecipientRow::try_into_recipient)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn list_active(&self, entitlement: &Entitlement) -> FleetResult<Vec<Recipient>> {
        let mut result = match entitlement {
            Entitlement::AllTenants => self
                .db
                .query(format!(
                    "SELECT {RECIPIENT_FIELDS} FROM recipient \
                     WHERE active = true ORDER BY created_at ASC"
                ))
                .await
                .map_err(DbError::from)?,
            Entitlement::Tenants(tenants) if tenants.is_empty() => return Ok(Vec::new()),
            Entitlement::Tenants(tenants) => {
                let tenants: Vec<String> = tenants.iter().map(Uuid::to_string).collect();
                self.db
                    .query(format!(
                        "SELECT {RECIPIENT_FIELDS} FROM recipient \
                         WHERE active = true AND tenant_id IN $tenants \
                         ORDER BY created_at ASC"
                    ))
                    .bind(("tenants", tenants))
                    .await
                    .map_err(DbError::from)?
            }
        };

        let rows: Vec<RecipientRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(RecipientRow::try_into_recipient)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_round_trip_through_storage_strings() {
        for channel in Channel::ALL {
            assert_eq!(parse_channel(channel_to_str(channel)).unwrap(), channel);
        }
        assert!(parse_channel("Pager").is_err());
    }
}
