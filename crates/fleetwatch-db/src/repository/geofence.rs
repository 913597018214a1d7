//! SurrealDB implementation of [`GeofenceRepository`].
//!
//! Ownership is stored flat (`owner_kind` + `owner_tenant_id`) and
//! sharing grants live in `geofence_assignment`, one row per
//! `(geofence, scope)`. Visibility plans are narrowed in the query by
//! owner and then decided per row by [`VisibilityPlan::permission_for`],
//! so the repository and the in-memory rules cannot disagree.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use fleetwatch_core::error::FleetResult;
use fleetwatch_core::models::geofence::{
    AlertMode, Assignment, AssignmentScope, Geofence, GeofenceOwner, GeofenceShape,
    LifecycleState, NewGeofence, UpdateGeofence,
};
use fleetwatch_core::repository::GeofenceRepository;
use fleetwatch_core::visibility::{VisibilityClause, VisibilityPlan, VisibleGeofence};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{debug, warn};
use uuid::Uuid;

use super::row::{parse_uuid, unknown};
use crate::error::DbError;

const GEOFENCE_FIELDS: &str = "meta::id(id) AS record_id, name, shape, owner_kind, \
     owner_tenant_id, alert_mode, entry_message, exit_message, state, deleted_at, \
     created_by, created_at, updated_at";

const ASSIGNMENT_FIELDS: &str =
    "meta::id(id) AS record_id, geofence_id, scope_key, tenant_id, created_at";

const ASSIGNMENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x5f1b_2e0c_8a47_4d6e_b3c1_77d0_9e24_af58);

fn assignment_id(geofence_id: Uuid, scope: AssignmentScope) -> Uuid {
    let name = format!("{geofence_id}/{}", scope.key());
    Uuid::new_v5(&ASSIGNMENT_ID_NAMESPACE, name.as_bytes())
}

fn alert_mode_to_str(mode: AlertMode) -> &'static str {
    match mode {
        AlertMode::EntryOnly => "EntryOnly",
        AlertMode::ExitOnly => "ExitOnly",
        AlertMode::EntryAndExit => "EntryAndExit",
        AlertMode::None => "None",
    }
}

fn parse_alert_mode(s: &str) -> Result<AlertMode, DbError> {
    match s {
        "EntryOnly" => Ok(AlertMode::EntryOnly),
        "ExitOnly" => Ok(AlertMode::ExitOnly),
        "EntryAndExit" => Ok(AlertMode::EntryAndExit),
        "None" => Ok(AlertMode::None),
        other => Err(unknown("alert mode", other)),
    }
}

fn shape_to_value(shape: &GeofenceShape) -> Result<serde_json::Value, DbError> {
    serde_json::to_value(shape).map_err(|e| DbError::Query(format!("unencodable shape: {e}")))
}

#[derive(Debug, SurrealValue)]
struct GeofenceRow {
    record_id: String,
    name: String,
    shape: serde_json::Value,
    owner_kind: String,
    owner_tenant_id: Option<String>,
    alert_mode: String,
    entry_message: Option<String>,
    exit_message: Option<String>,
    state: String,
    deleted_at: Option<DateTime<Utc>>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GeofenceRow {
    fn try_into_geofence(self) -> Result<Geofence, DbError> {
        let owner = match (self.owner_kind.as_str(), self.owner_tenant_id.as_deref()) {
            ("Platform", _) => GeofenceOwner::Platform,
            ("Tenant", Some(tenant)) => GeofenceOwner::Tenant(parse_uuid("owner tenant", tenant)?),
            (kind, _) => return Err(unknown("geofence owner", kind)),
        };
        let state = match (self.state.as_str(), self.deleted_at) {
            ("Active", _) => LifecycleState::Active,
            // Rows deleted before `deleted_at` was populated fall back to
            // the last update.
            ("Deleted", at) => LifecycleState::Deleted {
                at: at.unwrap_or(self.updated_at),
            },
            (other, _) => return Err(unknown("geofence state", other)),
        };
        let shape = serde_json::from_value(self.shape)
            .map_err(|e| DbError::Decode(format!("invalid geofence shape: {e}")))?;

        Ok(Geofence {
            id: parse_uuid("geofence", &self.record_id)?,
            name: self.name,
            shape,
            owner,
            alert_mode: parse_alert_mode(&self.alert_mode)?,
            entry_message: self.entry_message,
            exit_message: self.exit_message,
            state,
            created_by: parse_uuid("creator", &self.created_by)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct AssignmentRow {
    record_id: String,
    geofence_id: String,
    scope_key: String,
    tenant_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl AssignmentRow {
    fn try_into_assignment(self) -> Result<Assignment, DbError> {
        let scope = match self.tenant_id.as_deref() {
            None if self.scope_key == "global" => AssignmentScope::Global,
            Some(tenant) => AssignmentScope::Tenant(parse_uuid("assigned tenant", tenant)?),
            None => return Err(unknown("assignment scope", &self.scope_key)),
        };
        Ok(Assignment {
            id: parse_uuid("assignment", &self.record_id)?,
            geofence_id: parse_uuid("geofence", &self.geofence_id)?,
            scope,
            created_at: self.created_at,
        })
    }
}

/// Owner-level prefilter for one clause, with the tenant it binds.
fn clause_predicate(index: usize, clause: &VisibilityClause) -> (String, Option<(String, String)>) {
    match clause {
        VisibilityClause::OwnedBy(tenant_id) => {
            let param = format!("owner_{index}");
            (
                format!("(owner_kind = 'Tenant' AND owner_tenant_id = ${param})"),
                Some((param, tenant_id.to_string())),
            )
        }
        VisibilityClause::SharedWith(_) | VisibilityClause::GloballyShared => {
            ("owner_kind = 'Platform'".into(), None)
        }
    }
}

/// SurrealDB implementation of the geofence ownership store.
#[derive(Clone)]
pub struct SurrealGeofenceRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealGeofenceRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn assignments_for(
        &self,
        geofence_ids: Vec<String>,
    ) -> Result<HashMap<Uuid, Vec<AssignmentScope>>, DbError> {
        if geofence_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut result = self
            .db
            .query(format!(
                "SELECT {ASSIGNMENT_FIELDS} FROM geofence_assignment \
                 WHERE geofence_id IN $ids"
            ))
            .bind(("ids", geofence_ids))
            .await?;
        let rows: Vec<AssignmentRow> = result.take(0)?;

        let mut by_geofence: HashMap<Uuid, Vec<AssignmentScope>> = HashMap::new();
        for row in rows {
            let assignment = row.try_into_assignment()?;
            by_geofence
                .entry(assignment.geofence_id)
                .or_default()
                .push(assignment.scope);
        }
        Ok(by_geofence)
    }

    async fn remove_unassigned(&self, id: Uuid) {
        let removed = self
            .db
            .query("DELETE type::record('geofence', $id)")
            .bind(("id", id.to_string()))
            .await
            .and_then(|response| response.check());
        match removed {
            Ok(_) => debug!(geofence_id = %id, "Removed geofence after failed initial assignment"),
            Err(e) => warn!(geofence_id = %id, error = %e, "Failed to remove unassigned geofence"),
        }
    }

    async fn find_assignment(
        &self,
        geofence_id: Uuid,
        scope: AssignmentScope,
    ) -> Result<Option<Assignment>, DbError> {
        let mut result = self
            .db
            .query(format!(
                "SELECT {ASSIGNMENT_FIELDS} FROM geofence_assignment \
                 WHERE geofence_id = $geofence_id AND scope_key = $scope_key"
            ))
            .bind(("geofence_id", geofence_id.to_string()))
            .bind(("scope_key", scope.key()))
            .await?;
        let rows: Vec<AssignmentRow> = result.take(0)?;
        rows.into_iter()
            .next()
            .map(AssignmentRow::try_into_assignment)
            .transpose()
    }
}

impl<C: Connection> GeofenceRepository for SurrealGeofenceRepository<C> {
    async fn create(&self, input: NewGeofence) -> FleetResult<Geofence> {
        let id = Uuid::new_v4();
        let (owner_kind, owner_tenant_id) = match input.owner {
            GeofenceOwner::Platform => ("Platform", None),
            GeofenceOwner::Tenant(tenant_id) => ("Tenant", Some(tenant_id.to_string())),
        };

        let result = self
            .db
            .query(format!(
                "CREATE type::record('geofence', $id) SET \
                 name = $name, shape = $shape, \
                 owner_kind = $owner_kind, owner_tenant_id = $owner_tenant_id, \
                 alert_mode = $alert_mode, \
                 entry_message = $entry_message, exit_message = $exit_message, \
                 state = 'Active', created_by = $created_by \
                 RETURN {GEOFENCE_FIELDS}"
            ))
            .bind(("id", id.to_string()))
            .bind(("name", input.name))
            .bind(("shape", shape_to_value(&input.shape)?))
            .bind(("owner_kind", owner_kind.to_string()))
            .bind(("owner_tenant_id", owner_tenant_id))
            .bind(("alert_mode", alert_mode_to_str(input.alert_mode).to_string()))
            .bind(("entry_message", input.entry_message))
            .bind(("exit_message", input.exit_message))
            .bind(("created_by", input.created_by.to_string()))
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("geofence", e))?;

        let rows: Vec<GeofenceRow> = result.take(0).map_err(DbError::from)?;
        let geofence = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("geofence", id))?
            .try_into_geofence()?;

        if let Some(scope) = input.initial_assignment
            && let Err(e) = self.assign(geofence.id, scope).await
        {
            // An unassigned platform geofence would be invisible to everyone.
            self.remove_unassigned(geofence.id).await;
            return Err(e);
        }
        Ok(geofence)
    }

    async fn get_by_id(&self, id: Uuid) -> FleetResult<Geofence> {
        let mut result = self
            .db
            .query(format!(
                "SELECT {GEOFENCE_FIELDS} FROM type::record('geofence', $id)"
            ))
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<GeofenceRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("geofence", id))?;
        Ok(row.try_into_geofence()?)
    }

    async fn update(&self, id: Uuid, input: UpdateGeofence) -> FleetResult<Geofence> {
        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.shape.is_some() {
            sets.push("shape = $shape");
        }
        if input.alert_mode.is_some() {
            sets.push("alert_mode = $alert_mode");
        }
        if input.entry_message.is_some() {
            sets.push("entry_message = $entry_message");
        }
        if input.exit_message.is_some() {
            sets.push("exit_message = $exit_message");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('geofence', $id) SET {} \
             WHERE state = 'Active' RETURN {GEOFENCE_FIELDS}",
            sets.join(", ")
        );
        let mut builder = self.db.query(query).bind(("id", id.to_string()));
        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(ref shape) = input.shape {
            builder = builder.bind(("shape", shape_to_value(shape)?));
        }
        if let Some(mode) = input.alert_mode {
            builder = builder.bind(("alert_mode", alert_mode_to_str(mode).to_string()));
        }
        if let Some(entry_message) = input.entry_message {
            builder = builder.bind(("entry_message", entry_message));
        }
        if let Some(exit_message) = input.exit_message {
            builder = builder.bind(("exit_message", exit_message));
        }

        let result = builder.await.map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::from_statement("geofence", e))?;

        let rows: Vec<GeofenceRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("geofence", id))?;
        Ok(row.try_into_geofence()?)
    }

    async fn soft_delete(&self, id: Uuid) -> FleetResult<()> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('geofence', $id) SET \
                 state = 'Deleted', deleted_at = time::now(), updated_at = time::now() \
                 WHERE state = 'Active' RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<super::row::IdRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::not_found("geofence", id).into());
        }
        Ok(())
    }

    async fn list_visible(&self, plan: &VisibilityPlan) -> FleetResult<Vec<VisibleGeofence>> {
        if plan.clauses.is_empty() {
            return Ok(Vec::new());
        }

        let mut predicates = Vec::new();
        let mut params = Vec::new();
        for (index, (clause, _)) in plan.clauses.iter().enumerate() {
            let (predicate, param) = clause_predicate(index, clause);
            if !predicates.contains(&predicate) {
                predicates.push(predicate);
            }
            params.extend(param);
        }

        let query = format!(
            "SELECT {GEOFENCE_FIELDS} FROM geofence \
             WHERE state = 'Active' AND ({}) ORDER BY created_at ASC",
            predicates.join(" OR ")
        );
        let mut builder = self.db.query(query);
        for (name, value) in params {
            builder = builder.bind((name, value));
        }
        let mut result = builder.await.map_err(DbError::from)?;
        let rows: Vec<GeofenceRow> = result.take(0).map_err(DbError::from)?;

        let ids = rows.iter().map(|r| r.record_id.clone()).collect();
        let assignments = self.assignments_for(ids).await?;

        let mut visible = Vec::with_capacity(rows.len());
        for row in rows {
            let geofence = row.try_into_geofence()?;
            let scopes = assignments
                .get(&geofence.id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if let Some(permission) = plan.permission_for(&geofence, scopes) {
                visible.push(VisibleGeofence {
                    geofence,
                    permission,
                });
            }
        }
        debug!(clauses = plan.clauses.len(), visible = visible.len(), "Resolved visible geofences");
        Ok(visible)
    }

    async fn assign(&self, geofence_id: Uuid, scope: AssignmentScope) -> FleetResult<Assignment> {
        if let Some(existing) = self.find_assignment(geofence_id, scope).await? {
            return Ok(existing);
        }

        let id = assignment_id(geofence_id, scope);
        let result = self
            .db
            .query(format!(
                "CREATE type::record('geofence_assignment', $id) SET \
                 geofence_id = $geofence_id, scope_key = $scope_key, tenant_id = $tenant_id \
                 RETURN {ASSIGNMENT_FIELDS}"
            ))
            .bind(("id", id.to_string()))
            .bind(("geofence_id", geofence_id.to_string()))
            .bind(("scope_key", scope.key()))
            .bind(("tenant_id", scope.tenant_id().map(|t| t.to_string())))
            .await
            .map_err(DbError::from)?;

        match result.check() {
            Ok(mut result) => {
                let rows: Vec<AssignmentRow> = result.take(0).map_err(DbError::from)?;
                let row = rows
                    .into_iter()
                    .next()
                    .ok_or_else(|| DbError::not_found("geofence_assignment", id))?;
                Ok(row.try_into_assignment()?)
            }
            // A concurrent assign of the same pair won the race.
            Err(e) => match self.find_assignment(geofence_id, scope).await? {
                Some(existing) => Ok(existing),
                None => Err(DbError::from_statement("geofence_assignment", e).into()),
            },
        }
    }

    async fn unassign(&self, geofence_id: Uuid, scope: AssignmentScope) -> FleetResult<()> {
        self.db
            .query(
                "DELETE geofence_assignment \
                 WHERE geofence_id = $geofence_id AND scope_key = $scope_key",
            )
            .bind(("geofence_id", geofence_id.to_string()))
            .bind(("scope_key", scope.key()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_statement("geofence_assignment", e))?;
        Ok(())
    }

    async fn assignments(&self, geofence_id: Uuid) -> FleetResult<Vec<Assignment>> {
        let mut result = self
            .db
            .query(format!(
                "SELECT {ASSIGNMENT_FIELDS} FROM geofence_assignment \
                 WHERE geofence_id = $geofence_id ORDER BY created_at ASC"
            ))
            .bind(("geofence_id", geofence_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<AssignmentRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(AssignmentRow::try_into_assignment)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_ids_are_stable_per_scope() {
        let g = Uuid::new_v4();
        let t = Uuid::new_v4();
        assert_eq!(
            assignment_id(g, AssignmentScope::Tenant(t)),
            assignment_id(g, AssignmentScope::Tenant(t))
        );
        assert_ne!(
            assignment_id(g, AssignmentScope::Global),
            assignment_id(g, AssignmentScope::Tenant(t))
        );
    }

    #[test]
    fn owned_clause_binds_its_tenant() {
        let t = Uuid::new_v4();
        let (predicate, param) = clause_predicate(2, &VisibilityClause::OwnedBy(t));
        assert!(predicate.contains("$owner_2"));
        assert_eq!(param, Some(("owner_2".to_string(), t.to_string())));

        let (predicate, param) = clause_predicate(0, &VisibilityClause::GloballyShared);
        assert_eq!(predicate, "owner_kind = 'Platform'");
        assert!(param.is_none());
    }
}
