//! Audit recorder: best-effort writes, operator-only reads.

use fleetwatch_core::access::{Caller, Capability};
use fleetwatch_core::error::FleetResult;
use fleetwatch_core::models::audit::{
    ActorType, AuditLogEntry, AuditLogFilter, AuditStats, CreateAuditLogEntry, RequestMeta,
};
use fleetwatch_core::repository::AuditLogRepository;
use tracing::warn;

/// Who performed an audited action.
#[derive(Debug, Clone, Copy)]
pub enum Actor<'a> {
    Caller(&'a Caller),
    System,
}

/// Wraps an [`AuditLogRepository`] so that audit failures never reach
/// the business operation that triggered them.
#[derive(Clone)]
pub struct AuditRecorder<A: AuditLogRepository> {
    repo: A,
}

impl<A: AuditLogRepository> AuditRecorder<A> {
    pub fn new(repo: A) -> Self {
        Self { repo }
    }

    /// Append an entry. Errors are logged and dropped.
    pub async fn record(
        &self,
        actor: Actor<'_>,
        action: &str,
        resource_type: &str,
        resource_id: Option<String>,
        detail: Option<serde_json::Value>,
        request: RequestMeta,
    ) {
        let (actor_id, actor_type) = match actor {
            Actor::Caller(caller) => (Some(caller.user_id), caller.actor_type()),
            Actor::System => (None, ActorType::System),
        };
        let entry = CreateAuditLogEntry {
            actor_id,
            actor_type,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id,
            detail,
            request,
        };
        if let Err(e) = self.repo.append(entry).await {
            warn!(action, resource_type, error = %e, "Audit write failed");
        }
    }

    /// Entries matching `filter`, newest first.
    pub async fn query(
        &self,
        caller: &Caller,
        filter: AuditLogFilter,
    ) -> FleetResult<Vec<AuditLogEntry>> {
        caller.require(Capability::QueryAudit)?;
        self.repo.list(filter).await
    }

    /// Counts over the filtered set plus its `recent` newest entries.
    pub async fn statistics(
        &self,
        caller: &Caller,
        filter: AuditLogFilter,
        recent: usize,
    ) -> FleetResult<AuditStats> {
        let entries = self.query(caller, filter).await?;
        Ok(AuditStats::from_entries(&entries, recent))
    }
}
