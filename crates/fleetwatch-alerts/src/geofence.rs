//! Geofence service: visibility-aware reads, authorized mutations and
//! sharing management.

use fleetwatch_core::access::{Caller, Capability, is_allowed};
use fleetwatch_core::error::{FleetError, FleetResult};
use fleetwatch_core::models::audit::RequestMeta;
use fleetwatch_core::models::geofence::{
    Assignment, AssignmentScope, CreateGeofence, Geofence, UpdateGeofence,
};
use fleetwatch_core::repository::{AuditLogRepository, GeofenceRepository, TenantRepository};
use fleetwatch_core::visibility::{
    Permission, VisibilityFilter, VisibleGeofence, creation_plan, resolve_plan,
};
use tracing::info;
use uuid::Uuid;

use crate::audit::{Actor, AuditRecorder};
use crate::error::AlertError;

const RESOURCE: &str = "geofence";

pub struct GeofenceService<G, T, A>
where
    G: GeofenceRepository,
    T: TenantRepository,
    A: AuditLogRepository,
{
    geofences: G,
    tenants: T,
    audit: AuditRecorder<A>,
}

impl<G, T, A> GeofenceService<G, T, A>
where
    G: GeofenceRepository,
    T: TenantRepository,
    A: AuditLogRepository,
{
    pub fn new(geofences: G, tenants: T, audit: AuditRecorder<A>) -> Self {
        Self {
            geofences,
            tenants,
            audit,
        }
    }

    /// Geofences visible to `caller`, each with the caller's permission.
    pub async fn list_visible(
        &self,
        caller: &Caller,
        filter: VisibilityFilter,
        target_tenant: Option<Uuid>,
    ) -> FleetResult<Vec<VisibleGeofence>> {
        let plan = resolve_plan(caller, filter, target_tenant)?;
        self.geofences.list_visible(&plan).await
    }

    /// A single active geofence, if the caller can see it.
    ///
    /// Geofences outside the caller's view are reported as not found.
    pub async fn get(&self, caller: &Caller, id: Uuid) -> FleetResult<VisibleGeofence> {
        caller.require(Capability::ListGeofences)?;
        let geofence = self.active(id).await?;
        if is_allowed(caller.role, Capability::MutateAnyGeofence) {
            return Ok(VisibleGeofence {
                geofence,
                permission: Permission::Editable,
            });
        }
        let plan = resolve_plan(caller, VisibilityFilter::All, None)?;
        let scopes = self.scopes(id).await?;
        let permission = plan
            .permission_for(&geofence, &scopes)
            .ok_or_else(|| FleetError::not_found(RESOURCE, id))?;
        Ok(VisibleGeofence {
            geofence,
            permission,
        })
    }

    pub async fn create(
        &self,
        caller: &Caller,
        input: CreateGeofence,
        request: RequestMeta,
    ) -> FleetResult<Geofence> {
        let new = creation_plan(caller, input)?;
        if let Some(AssignmentScope::Tenant(tenant_id)) = new.initial_assignment {
            self.ensure_tenant(tenant_id).await?;
        }

        let geofence = self.geofences.create(new).await?;
        info!(geofence_id = %geofence.id, owner = ?geofence.owner, "Geofence created");

        self.audit
            .record(
                Actor::Caller(caller),
                "geofence.create",
                RESOURCE,
                Some(geofence.id.to_string()),
                Some(serde_json::json!({
                    "name": geofence.name,
                    "owner": geofence.owner,
                })),
                request,
            )
            .await;
        Ok(geofence)
    }

    pub async fn update(
        &self,
        caller: &Caller,
        id: Uuid,
        input: UpdateGeofence,
        request: RequestMeta,
    ) -> FleetResult<Geofence> {
        let existing = self.active(id).await?;
        caller.authorize_geofence_mutation(&existing)?;

        if let Some(ref shape) = input.shape {
            shape.validate()?;
        }
        let input = UpdateGeofence {
            name: match input.name {
                Some(name) if name.trim().is_empty() => {
                    return Err(FleetError::validation("geofence name must not be blank"));
                }
                other => other.map(|n| n.trim().to_string()),
            },
            ..input
        };

        let detail = serde_json::json!({
            "name": input.name.is_some(),
            "shape": input.shape.is_some(),
            "alert_mode": input.alert_mode,
            "entry_message": input.entry_message.is_some(),
            "exit_message": input.exit_message.is_some(),
        });
        let updated = self.geofences.update(id, input).await?;

        self.audit
            .record(
                Actor::Caller(caller),
                "geofence.update",
                RESOURCE,
                Some(id.to_string()),
                Some(detail),
                request,
            )
            .await;
        Ok(updated)
    }

    /// Soft-delete. A geofence that is already deleted is not found.
    pub async fn delete(&self, caller: &Caller, id: Uuid, request: RequestMeta) -> FleetResult<()> {
        let existing = self.active(id).await?;
        caller.authorize_geofence_mutation(&existing)?;

        self.geofences.soft_delete(id).await?;
        info!(geofence_id = %id, "Geofence deleted");

        self.audit
            .record(
                Actor::Caller(caller),
                "geofence.delete",
                RESOURCE,
                Some(id.to_string()),
                Some(serde_json::json!({ "name": existing.name })),
                request,
            )
            .await;
        Ok(())
    }

    /// Grant `scope` visibility of a platform geofence.
    pub async fn share(
        &self,
        caller: &Caller,
        id: Uuid,
        scope: AssignmentScope,
        request: RequestMeta,
    ) -> FleetResult<Assignment> {
        self.check_shareable(caller, id, scope).await?;
        let assignment = self.geofences.assign(id, scope).await?;

        self.audit
            .record(
                Actor::Caller(caller),
                "geofence.share",
                RESOURCE,
                Some(id.to_string()),
                Some(serde_json::json!({ "scope": scope.key() })),
                request,
            )
            .await;
        Ok(assignment)
    }

    pub async fn unshare(
        &self,
        caller: &Caller,
        id: Uuid,
        scope: AssignmentScope,
        request: RequestMeta,
    ) -> FleetResult<()> {
        self.check_shareable(caller, id, scope).await?;
        self.geofences.unassign(id, scope).await?;

        self.audit
            .record(
                Actor::Caller(caller),
                "geofence.unshare",
                RESOURCE,
                Some(id.to_string()),
                Some(serde_json::json!({ "scope": scope.key() })),
                request,
            )
            .await;
        Ok(())
    }

    pub async fn assignments(&self, caller: &Caller, id: Uuid) -> FleetResult<Vec<Assignment>> {
        caller.require(Capability::ShareGeofence)?;
        self.active(id).await?;
        self.geofences.assignments(id).await
    }

    async fn check_shareable(
        &self,
        caller: &Caller,
        id: Uuid,
        scope: AssignmentScope,
    ) -> FleetResult<()> {
        caller.require(Capability::ShareGeofence)?;
        let geofence = self.active(id).await?;
        if !geofence.owner.is_platform() {
            return Err(AlertError::TenantOwnedShare(id).into());
        }
        if let AssignmentScope::Tenant(tenant_id) = scope {
            self.ensure_tenant(tenant_id).await?;
        }
        Ok(())
    }

    async fn active(&self, id: Uuid) -> FleetResult<Geofence> {
        let geofence = self.geofences.get_by_id(id).await?;
        if !geofence.state.is_active() {
            return Err(FleetError::not_found(RESOURCE, id));
        }
        Ok(geofence)
    }

    async fn scopes(&self, id: Uuid) -> FleetResult<Vec<AssignmentScope>> {
        Ok(self
            .geofences
            .assignments(id)
            .await?
            .into_iter()
            .map(|a| a.scope)
            .collect())
    }

    async fn ensure_tenant(&self, tenant_id: Uuid) -> FleetResult<()> {
        match self.tenants.get_by_id(tenant_id).await {
            Ok(_) => Ok(()),
            Err(FleetError::NotFound { .. }) => Err(AlertError::UnknownTenant(tenant_id).into()),
            Err(e) => Err(e),
        }
    }
}
