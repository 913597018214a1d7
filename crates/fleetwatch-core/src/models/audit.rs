//! Audit log domain model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ActorType {
    Operator,
    TenantUser,
    System,
}

/// Request metadata captured alongside an action.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    /// `None` for system actions.
    pub actor_id: Option<Uuid>,
    pub actor_type: ActorType,
    /// Dotted action name, e.g. `geofence.create`.
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub detail: serde_json::Value,
    pub request: RequestMeta,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuditLogEntry {
    pub actor_id: Option<Uuid>,
    pub actor_type: ActorType,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub detail: Option<serde_json::Value>,
    pub request: RequestMeta,
}

/// Default number of entries returned by an audit query.
pub const DEFAULT_AUDIT_LIMIT: u64 = 100;

/// Query filters for audit log entries.
#[derive(Debug, Clone)]
pub struct AuditLogFilter {
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: u64,
}

impl Default for AuditLogFilter {
    fn default() -> Self {
        Self {
            actor_id: None,
            action: None,
            resource_type: None,
            from: None,
            to: None,
            limit: DEFAULT_AUDIT_LIMIT,
        }
    }
}

/// Aggregate view over a filtered set of audit entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: u64,
    pub by_action: BTreeMap<String, u64>,
    /// Keyed by actor id, `"system"` for actor-less entries.
    pub by_actor: BTreeMap<String, u64>,
    pub by_resource_type: BTreeMap<String, u64>,
    pub recent: Vec<AuditLogEntry>,
}

impl AuditStats {
    /// Build statistics from entries ordered newest first.
    pub fn from_entries(entries: &[AuditLogEntry], recent: usize) -> Self {
        let mut stats = AuditStats {
            total: entries.len() as u64,
            ..Default::default()
        };
        for entry in entries {
            *stats.by_action.entry(entry.action.clone()).or_default() += 1;
            let actor = entry
                .actor_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "system".into());
            *stats.by_actor.entry(actor).or_default() += 1;
            *stats
                .by_resource_type
                .entry(entry.resource_type.clone())
                .or_default() += 1;
        }
        stats.recent = entries.iter().take(recent).cloned().collect();
        stats
    }
}
