//! SurrealDB implementation of [`AuditLogRepository`].
//!
//! The table's permissions forbid update and delete, and this type only
//! ever issues CREATE and SELECT.

use chrono::{DateTime, Utc};
use fleetwatch_core::error::FleetResult;
use fleetwatch_core::models::audit::{
    ActorType, AuditLogEntry, AuditLogFilter, CreateAuditLogEntry, RequestMeta,
};
use fleetwatch_core::repository::AuditLogRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::row::{parse_uuid, unknown};
use crate::error::DbError;

const AUDIT_FIELDS: &str = "meta::id(id) AS record_id, actor_id, actor_type, action, \
     resource_type, resource_id, detail, ip_address, user_agent, timestamp";

fn actor_type_to_str(actor: ActorType) -> &'static str {
    match actor {
        ActorType::Operator => "Operator",
        ActorType::TenantUser => "TenantUser",
        ActorType::System => "System",
    }
}

fn parse_actor_type(s: &str) -> Result<ActorType, DbError> {
    match s {
        "Operator" => Ok(ActorType::Operator),
        "TenantUser" => Ok(ActorType::TenantUser),
        "System" => Ok(ActorType::System),
        other => Err(unknown("actor type", other)),
    }
}

/// The `detail` column is an object; scalars are wrapped under `value`.
fn detail_object(detail: Option<serde_json::Value>) -> serde_json::Value {
    match detail {
        None | Some(serde_json::Value::Null) => serde_json::json!({}),
        Some(object @ serde_json::Value::Object(_)) => object,
        Some(other) => serde_json::json!({ "value": other }),
    }
}

#[derive(Debug, SurrealValue)]
struct AuditRow {
    record_id: String,
    actor_id: Option<String>,
    actor_type: String,
    action: String,
    resource_type: String,
    resource_id: Option<String>,
    detail: serde_json::Value,
    ip_address: Option<String>,
    user_agent: Option<String>,
    timestamp: DateTime<Utc>,
}

impl AuditRow {
    fn try_into_entry(self) -> Result<AuditLogEntry, DbError> {
        Ok(AuditLogEntry {
            id: parse_uuid("audit entry", &self.record_id)?,
            actor_id: self
                .actor_id
                .as_deref()
                .map(|a| parse_uuid("actor", a))
                .transpose()?,
            actor_type: parse_actor_type(&self.actor_type)?,
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            detail: self.detail,
            request: RequestMeta {
                ip_address: self.ip_address,
                user_agent: self.user_agent,
            },
            timestamp: self.timestamp,
        })
    }
}

/// SurrealDB implementation of the append-only audit log.
#[derive(Clone)]
pub struct SurrealAuditLogRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditLogRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditLogRepository for SurrealAuditLogRepository<C> {
    async fn append(&self, input: CreateAuditLogEntry) -> FleetResult<AuditLogEntry> {
        let id = Uuid::new_v4();

        let result = self
            .db
            .query(format!(
                "CREATE type::record('audit_log', $id) SET \
                 actor_id = $actor_id, actor_type = $actor_type, \
                 action = $action, resource_type = $resource_type, \
                 resource_id = $resource_id, detail = $detail, \
                 ip_address = $ip_address, user_agent = $user_agent \
                 RETURN {AUDIT_FIELDS}"
            ))
            .bind(("id", id.to_string()))
            .bind(("actor_id", input.actor_id.map(|a| a.to_string())))
            .bind(("actor_type", actor_type_to_str(input.actor_type).to_string()))
            .bind(("action", input.action))
            .bind(("resource_type", input.resource_type))
            .bind(("resource_id", input.resource_id))
            .bind(("detail", detail_object(input.detail)))
            .bind(("ip_address", input.request.ip_address))
            .bind(("user_agent", input.request.user_agent))
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("audit_log", e))?;

        let rows: Vec<AuditRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("audit_log", id))?;
        Ok(row.try_into_entry()?)
    }

    async fn list(&self, filter: AuditLogFilter) -> FleetResult<Vec<AuditLogEntry>> {
        let mut conditions = Vec::new();
        if filter.actor_id.is_some() {
            conditions.push("actor_id = $actor_id");
        }
        if filter.action.is_some() {
            conditions.push("action = $action");
        }
        if filter.resource_type.is_some() {
            conditions.push("resource_type = $resource_type");
        }
        if filter.from.is_some() {
            conditions.push("timestamp >= $from");
        }
        if filter.to.is_some() {
            conditions.push("timestamp <= $to");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {AUDIT_FIELDS} FROM audit_log {where_clause} \
             ORDER BY timestamp DESC LIMIT $limit"
        );
        let mut builder = self.db.query(query).bind(("limit", filter.limit));
        if let Some(actor_id) = filter.actor_id {
            builder = builder.bind(("actor_id", actor_id.to_string()));
        }
        if let Some(action) = filter.action {
            builder = builder.bind(("action", action));
        }
        if let Some(resource_type) = filter.resource_type {
            builder = builder.bind(("resource_type", resource_type));
        }
        if let Some(from) = filter.from {
            builder = builder.bind(("from", from));
        }
        if let Some(to) = filter.to {
            builder = builder.bind(("to", to));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let rows: Vec<AuditRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(AuditRow::try_into_entry)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
