//! Caller identity and the role capability table.
//!
//! Authorization is decided once, at the service boundary, by looking up
//! `(role, capability)` in [`is_allowed`] and, for tenant users, checking
//! ownership of the target resource.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FleetError, FleetResult};
use crate::models::audit::ActorType;
use crate::models::geofence::{Geofence, GeofenceOwner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Platform operator staff.
    Operator,
    /// A user belonging to one tenant.
    TenantUser { tenant_id: Uuid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    ListGeofences,
    CreateGeofence,
    MutateOwnGeofence,
    MutateAnyGeofence,
    ShareGeofence,
    ManageOwnRecipients,
    ManageAnyRecipients,
    ViewDeliveries,
    QueryAudit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoleKind {
    Operator,
    TenantUser,
}

const CAPABILITY_TABLE: &[(RoleKind, Capability)] = &[
    (RoleKind::Operator, Capability::ListGeofences),
    (RoleKind::Operator, Capability::CreateGeofence),
    (RoleKind::Operator, Capability::MutateOwnGeofence),
    (RoleKind::Operator, Capability::MutateAnyGeofence),
    (RoleKind::Operator, Capability::ShareGeofence),
    (RoleKind::Operator, Capability::ManageOwnRecipients),
    (RoleKind::Operator, Capability::ManageAnyRecipients),
    (RoleKind::Operator, Capability::ViewDeliveries),
    (RoleKind::Operator, Capability::QueryAudit),
    (RoleKind::TenantUser, Capability::ListGeofences),
    (RoleKind::TenantUser, Capability::CreateGeofence),
    (RoleKind::TenantUser, Capability::MutateOwnGeofence),
    (RoleKind::TenantUser, Capability::ManageOwnRecipients),
];

impl Role {
    fn kind(&self) -> RoleKind {
        match self {
            Role::Operator => RoleKind::Operator,
            Role::TenantUser { .. } => RoleKind::TenantUser,
        }
    }
}

pub fn is_allowed(role: Role, capability: Capability) -> bool {
    let kind = role.kind();
    CAPABILITY_TABLE
        .iter()
        .any(|(k, c)| *k == kind && *c == capability)
}

/// The authenticated identity behind a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn operator(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Operator,
        }
    }

    pub fn tenant_user(user_id: Uuid, tenant_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::TenantUser { tenant_id },
        }
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        match self.role {
            Role::Operator => None,
            Role::TenantUser { tenant_id } => Some(tenant_id),
        }
    }

    pub fn actor_type(&self) -> ActorType {
        match self.role {
            Role::Operator => ActorType::Operator,
            Role::TenantUser { .. } => ActorType::TenantUser,
        }
    }

    pub fn require(&self, capability: Capability) -> FleetResult<()> {
        if is_allowed(self.role, capability) {
            Ok(())
        } else {
            Err(FleetError::denied(format!(
                "{:?} may not perform {capability:?}",
                self.actor_type()
            )))
        }
    }

    /// Check that the caller may edit or delete `geofence`.
    pub fn authorize_geofence_mutation(&self, geofence: &Geofence) -> FleetResult<()> {
        if is_allowed(self.role, Capability::MutateAnyGeofence) {
            return Ok(());
        }
        self.require(Capability::MutateOwnGeofence)?;
        match (self.role, geofence.owner) {
            (Role::TenantUser { tenant_id }, GeofenceOwner::Tenant(owner)) if owner == tenant_id => {
                Ok(())
            }
            (_, GeofenceOwner::Platform) => Err(FleetError::denied(format!(
                "geofence {} is owned by the platform and shared read-only",
                geofence.id
            ))),
            (_, GeofenceOwner::Tenant(_)) => Err(FleetError::denied(format!(
                "geofence {} belongs to another tenant",
                geofence.id
            ))),
        }
    }

    /// Resolve which tenant's recipients the caller may manage.
    ///
    /// Tenant users are pinned to their own tenant; operators must name
    /// one.
    pub fn recipient_tenant(&self, requested: Option<Uuid>) -> FleetResult<Uuid> {
        match self.role {
            Role::TenantUser { tenant_id } => {
                self.require(Capability::ManageOwnRecipients)?;
                match requested {
                    Some(other) if other != tenant_id => Err(FleetError::denied(
                        "tenant users may only manage their own tenant's recipients",
                    )),
                    _ => Ok(tenant_id),
                }
            }
            Role::Operator => {
                self.require(Capability::ManageAnyRecipients)?;
                requested.ok_or_else(|| {
                    FleetError::validation("operators must name the tenant of the recipient")
                })
            }
        }
    }
}
