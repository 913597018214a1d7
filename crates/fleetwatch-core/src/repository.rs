//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Tenant-scoped repositories
//! require a `tenant_id` parameter to enforce data isolation. Repositories
//! store what they are given; authorization and input validation happen
//! in the services layer.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::FleetResult;
use crate::matching::Entitlement;
use crate::models::{
    audit::{AuditLogEntry, AuditLogFilter, CreateAuditLogEntry},
    delivery::{Delivery, NewDelivery, PendingRecord},
    event::{GeofenceEvent, IngestOutcome, NewEvent},
    geofence::{Assignment, AssignmentScope, Geofence, NewGeofence, UpdateGeofence},
    recipient::{CreateRecipient, Recipient, UpdateRecipient},
    tenant::{CreateTenant, Tenant, UpdateTenant},
};
use crate::visibility::{VisibilityPlan, VisibleGeofence};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Tenants (global scope)
// ---------------------------------------------------------------------------

pub trait TenantRepository: Send + Sync {
    fn create(&self, input: CreateTenant) -> impl Future<Output = FleetResult<Tenant>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = FleetResult<Tenant>> + Send;
    fn get_by_slug(&self, slug: &str) -> impl Future<Output = FleetResult<Tenant>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateTenant,
    ) -> impl Future<Output = FleetResult<Tenant>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = FleetResult<PaginatedResult<Tenant>>> + Send;
}

// ---------------------------------------------------------------------------
// Geofences & assignments (ownership store)
// ---------------------------------------------------------------------------

pub trait GeofenceRepository: Send + Sync {
    /// Insert a geofence and its initial assignment, if any.
    fn create(&self, input: NewGeofence) -> impl Future<Output = FleetResult<Geofence>> + Send;
    /// Fetch a geofence in any lifecycle state.
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = FleetResult<Geofence>> + Send;
    /// Update an active geofence.
    fn update(
        &self,
        id: Uuid,
        input: UpdateGeofence,
    ) -> impl Future<Output = FleetResult<Geofence>> + Send;
    /// Soft-delete: marks the geofence deleted, rows are kept.
    fn soft_delete(&self, id: Uuid) -> impl Future<Output = FleetResult<()>> + Send;
    /// Active geofences selected by the plan, each with its permission.
    fn list_visible(
        &self,
        plan: &VisibilityPlan,
    ) -> impl Future<Output = FleetResult<Vec<VisibleGeofence>>> + Send;

    /// Add a sharing grant. Re-adding an existing pair returns it.
    fn assign(
        &self,
        geofence_id: Uuid,
        scope: AssignmentScope,
    ) -> impl Future<Output = FleetResult<Assignment>> + Send;
    fn unassign(
        &self,
        geofence_id: Uuid,
        scope: AssignmentScope,
    ) -> impl Future<Output = FleetResult<()>> + Send;
    fn assignments(
        &self,
        geofence_id: Uuid,
    ) -> impl Future<Output = FleetResult<Vec<Assignment>>> + Send;
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

pub trait EventRepository: Send + Sync {
    /// Insert guarded by the dedupe key; a conflict yields
    /// [`IngestOutcome::Duplicate`].
    fn insert(&self, input: NewEvent) -> impl Future<Output = FleetResult<IngestOutcome>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = FleetResult<GeofenceEvent>> + Send;
    /// Atomically flip one unprocessed event to processed and return it.
    fn claim_next(&self) -> impl Future<Output = FleetResult<Option<GeofenceEvent>>> + Send;
    /// Mark a claimed event as fully processed.
    fn complete(&self, id: Uuid) -> impl Future<Output = FleetResult<()>> + Send;
    /// Undo a claim that did not complete.
    fn release(&self, id: Uuid) -> impl Future<Output = FleetResult<()>> + Send;
    /// Release claims taken before `claimed_before` that never completed.
    fn release_stale_claims(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> impl Future<Output = FleetResult<u64>> + Send;
    fn list_unprocessed(
        &self,
        limit: u64,
    ) -> impl Future<Output = FleetResult<Vec<GeofenceEvent>>> + Send;
}

// ---------------------------------------------------------------------------
// Recipients (tenant-scoped)
// ---------------------------------------------------------------------------

pub trait RecipientRepository: Send + Sync {
    fn create(&self, input: CreateRecipient)
    -> impl Future<Output = FleetResult<Recipient>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = FleetResult<Recipient>> + Send;
    fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateRecipient,
    ) -> impl Future<Output = FleetResult<Recipient>> + Send;
    /// Hard delete.
    fn delete(&self, tenant_id: Uuid, id: Uuid) -> impl Future<Output = FleetResult<()>> + Send;
    fn list(
        &self,
        tenant_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = FleetResult<PaginatedResult<Recipient>>> + Send;
    /// Active recipients of every entitled tenant.
    fn list_active(
        &self,
        entitlement: &Entitlement,
    ) -> impl Future<Output = FleetResult<Vec<Recipient>>> + Send;
}

// ---------------------------------------------------------------------------
// Deliveries
// ---------------------------------------------------------------------------

pub trait DeliveryRepository: Send + Sync {
    /// Record a pending delivery, or report the existing row for the same
    /// `(event, recipient, channel)`.
    fn record_pending(
        &self,
        input: NewDelivery,
        pending_timeout: Duration,
    ) -> impl Future<Output = FleetResult<PendingRecord>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = FleetResult<Delivery>> + Send;
    /// `pending → sent`. Returns `false` if the delivery was not pending.
    fn mark_sent(
        &self,
        id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> impl Future<Output = FleetResult<bool>> + Send;
    /// `pending → failed`. Returns `false` if the delivery was not pending.
    fn mark_failed(&self, id: Uuid, detail: String)
    -> impl Future<Output = FleetResult<bool>> + Send;
    /// `pending → skipped`. Returns `false` if the delivery was not pending.
    fn mark_skipped(
        &self,
        id: Uuid,
        reason: String,
    ) -> impl Future<Output = FleetResult<bool>> + Send;
    fn list_for_event(
        &self,
        event_id: Uuid,
    ) -> impl Future<Output = FleetResult<Vec<Delivery>>> + Send;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

pub trait AuditLogRepository: Send + Sync {
    /// Append a new audit log entry. No update or delete operations exist.
    fn append(
        &self,
        input: CreateAuditLogEntry,
    ) -> impl Future<Output = FleetResult<AuditLogEntry>> + Send;
    /// Entries matching the filter, newest first, at most `filter.limit`.
    fn list(
        &self,
        filter: AuditLogFilter,
    ) -> impl Future<Output = FleetResult<Vec<AuditLogEntry>>> + Send;
}
