//! Geofence visibility rules.
//!
//! A [`VisibilityPlan`] is an ordered list of clauses, each granting a
//! [`Permission`] to the geofences it selects. Plans are built per
//! `(role, filter)` combination by [`resolve_plan`] and can be evaluated
//! in memory with [`VisibilityPlan::permission_for`] or translated into a
//! storage query by the repository layer. Soft-deleted geofences never
//! match any clause.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::{Caller, Capability, Role};
use crate::error::{FleetError, FleetResult};
use crate::models::geofence::{
    AssignmentScope, CreateGeofence, Geofence, GeofenceOwner, NewGeofence,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VisibilityFilter {
    Own,
    Shared,
    #[default]
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    Editable,
    ReadOnly,
}

/// A single selection rule over active geofences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityClause {
    /// Geofences owned by the tenant.
    OwnedBy(Uuid),
    /// Platform geofences shared globally or with the tenant.
    SharedWith(Uuid),
    /// Platform geofences with a global assignment.
    GloballyShared,
}

impl VisibilityClause {
    pub fn matches(&self, geofence: &Geofence, assignments: &[AssignmentScope]) -> bool {
        if !geofence.state.is_active() {
            return false;
        }
        match self {
            VisibilityClause::OwnedBy(tenant_id) => {
                geofence.owner == GeofenceOwner::Tenant(*tenant_id)
            }
            VisibilityClause::SharedWith(tenant_id) => {
                geofence.owner.is_platform()
                    && assignments.iter().any(|scope| {
                        matches!(scope, AssignmentScope::Global)
                            || *scope == AssignmentScope::Tenant(*tenant_id)
                    })
            }
            VisibilityClause::GloballyShared => {
                geofence.owner.is_platform() && assignments.contains(&AssignmentScope::Global)
            }
        }
    }
}

/// A geofence together with what the caller may do with it.
#[derive(Debug, Clone)]
pub struct VisibleGeofence {
    pub geofence: Geofence,
    pub permission: Permission,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityPlan {
    pub clauses: Vec<(VisibilityClause, Permission)>,
}

impl VisibilityPlan {
    /// Permission granted by the first matching clause, if any.
    pub fn permission_for(
        &self,
        geofence: &Geofence,
        assignments: &[AssignmentScope],
    ) -> Option<Permission> {
        self.clauses
            .iter()
            .find(|(clause, _)| clause.matches(geofence, assignments))
            .map(|(_, permission)| *permission)
    }
}

/// Build the visibility plan for a caller.
///
/// `target_tenant` is only meaningful for operators; a tenant user may
/// only name their own tenant.
pub fn resolve_plan(
    caller: &Caller,
    filter: VisibilityFilter,
    target_tenant: Option<Uuid>,
) -> FleetResult<VisibilityPlan> {
    caller.require(Capability::ListGeofences)?;

    let clauses = match caller.role {
        Role::TenantUser { tenant_id } => {
            if target_tenant.is_some_and(|t| t != tenant_id) {
                return Err(FleetError::denied(
                    "tenant users cannot list another tenant's geofences",
                ));
            }
            let own = (VisibilityClause::OwnedBy(tenant_id), Permission::Editable);
            let shared = (VisibilityClause::SharedWith(tenant_id), Permission::ReadOnly);
            match filter {
                VisibilityFilter::Own => vec![own],
                VisibilityFilter::Shared => vec![shared],
                VisibilityFilter::All => vec![own, shared],
            }
        }
        // Operators see everything they can edit; the filter does not
        // narrow their view.
        Role::Operator => match target_tenant {
            None => vec![(VisibilityClause::GloballyShared, Permission::Editable)],
            Some(tenant_id) => vec![
                (VisibilityClause::OwnedBy(tenant_id), Permission::Editable),
                (VisibilityClause::GloballyShared, Permission::Editable),
            ],
        },
    };

    Ok(VisibilityPlan { clauses })
}

/// Decide ownership and initial sharing for a new geofence.
pub fn creation_plan(caller: &Caller, input: CreateGeofence) -> FleetResult<NewGeofence> {
    caller.require(Capability::CreateGeofence)?;
    input.shape.validate()?;
    if input.name.trim().is_empty() {
        return Err(FleetError::validation("geofence name must not be blank"));
    }

    let (owner, initial_assignment) = match caller.role {
        Role::TenantUser { tenant_id } => {
            if input.target_tenant_id.is_some_and(|t| t != tenant_id) {
                return Err(FleetError::denied(
                    "tenant users cannot create geofences for another tenant",
                ));
            }
            (GeofenceOwner::Tenant(tenant_id), None)
        }
        Role::Operator => {
            let scope = input
                .target_tenant_id
                .map(AssignmentScope::Tenant)
                .unwrap_or(AssignmentScope::Global);
            (GeofenceOwner::Platform, Some(scope))
        }
    };

    Ok(NewGeofence {
        name: input.name.trim().to_string(),
        shape: input.shape,
        owner,
        alert_mode: input.alert_mode,
        entry_message: input.entry_message,
        exit_message: input.exit_message,
        created_by: caller.user_id,
        initial_assignment,
    })
}
