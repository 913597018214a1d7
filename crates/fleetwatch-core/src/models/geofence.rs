//! Geofence domain model.
//!
//! A geofence is owned either by the platform operator or by exactly one
//! tenant. Platform geofences are extended to tenants through
//! [`Assignment`]s; tenant geofences are never shared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FleetError, FleetResult};
use crate::models::event::Direction;

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn validate(&self) -> FleetResult<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(FleetError::validation(format!(
                "latitude {} is out of range",
                self.lat
            )));
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            return Err(FleetError::validation(format!(
                "longitude {} is out of range",
                self.lon
            )));
        }
        Ok(())
    }
}

/// Geometry of a geofence, stored as a tagged shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeofenceShape {
    Circle { center: GeoPoint, radius_m: f64 },
    Polygon { vertices: Vec<GeoPoint> },
}

impl GeofenceShape {
    pub fn validate(&self) -> FleetResult<()> {
        match self {
            GeofenceShape::Circle { center, radius_m } => {
                center.validate()?;
                if !radius_m.is_finite() || *radius_m <= 0.0 {
                    return Err(FleetError::validation(
                        "circle radius must be a positive number of meters",
                    ));
                }
            }
            GeofenceShape::Polygon { vertices } => {
                if vertices.len() < 3 {
                    return Err(FleetError::validation(
                        "polygon needs at least three vertices",
                    ));
                }
                for vertex in vertices {
                    vertex.validate()?;
                }
            }
        }
        Ok(())
    }
}

/// Who owns a geofence.
///
/// The tenant id is carried by the variant, so a platform geofence can
/// never reference a tenant and a tenant geofence always does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeofenceOwner {
    Platform,
    Tenant(Uuid),
}

impl GeofenceOwner {
    pub fn tenant_id(&self) -> Option<Uuid> {
        match self {
            GeofenceOwner::Platform => None,
            GeofenceOwner::Tenant(id) => Some(*id),
        }
    }

    pub fn is_platform(&self) -> bool {
        matches!(self, GeofenceOwner::Platform)
    }
}

/// Which crossings of a geofence raise alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertMode {
    EntryOnly,
    ExitOnly,
    EntryAndExit,
    None,
}

impl AlertMode {
    pub fn fires_on(&self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (AlertMode::EntryOnly, Direction::Entry)
                | (AlertMode::ExitOnly, Direction::Exit)
                | (AlertMode::EntryAndExit, _)
        )
    }
}

/// Lifecycle of a soft-deletable entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Active,
    Deleted { at: DateTime<Utc> },
}

impl LifecycleState {
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geofence {
    pub id: Uuid,
    pub name: String,
    pub shape: GeofenceShape,
    pub owner: GeofenceOwner,
    pub alert_mode: AlertMode,
    /// Template rendered for entry alerts; see [`crate::message`].
    pub entry_message: Option<String>,
    /// Template rendered for exit alerts.
    pub exit_message: Option<String>,
    pub state: LifecycleState,
    /// The user who created the geofence.
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Geofence {
    pub fn message_template(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Entry => self.entry_message.as_deref(),
            Direction::Exit => self.exit_message.as_deref(),
        }
    }
}

/// Caller-facing input for creating a geofence.
///
/// Ownership is not part of the input: it is decided by the caller's role
/// (see [`crate::visibility::creation_plan`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGeofence {
    pub name: String,
    pub shape: GeofenceShape,
    pub alert_mode: AlertMode,
    pub entry_message: Option<String>,
    pub exit_message: Option<String>,
    /// Operators only: share the new platform geofence with this tenant
    /// instead of globally.
    pub target_tenant_id: Option<Uuid>,
}

/// Fully resolved record handed to the repository.
#[derive(Debug, Clone)]
pub struct NewGeofence {
    pub name: String,
    pub shape: GeofenceShape,
    pub owner: GeofenceOwner,
    pub alert_mode: AlertMode,
    pub entry_message: Option<String>,
    pub exit_message: Option<String>,
    pub created_by: Uuid,
    /// Assignment created together with the geofence (platform only).
    pub initial_assignment: Option<AssignmentScope>,
}

/// Fields that can be updated on an existing geofence.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateGeofence {
    pub name: Option<String>,
    pub shape: Option<GeofenceShape>,
    pub alert_mode: Option<AlertMode>,
    /// `Some(Some(t))` = set, `Some(None)` = clear, `None` = no change.
    pub entry_message: Option<Option<String>>,
    pub exit_message: Option<Option<String>>,
}

/// Target of a sharing grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssignmentScope {
    Global,
    Tenant(Uuid),
}

impl AssignmentScope {
    /// Stable key used for the (geofence, scope) uniqueness constraint.
    pub fn key(&self) -> String {
        match self {
            AssignmentScope::Global => "global".into(),
            AssignmentScope::Tenant(id) => format!("tenant:{id}"),
        }
    }

    pub fn tenant_id(&self) -> Option<Uuid> {
        match self {
            AssignmentScope::Global => None,
            AssignmentScope::Tenant(id) => Some(*id),
        }
    }
}

/// A sharing grant from a platform geofence to one or all tenants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub geofence_id: Uuid,
    pub scope: AssignmentScope,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_mode_gates_directions() {
        assert!(AlertMode::EntryOnly.fires_on(Direction::Entry));
        assert!(!AlertMode::EntryOnly.fires_on(Direction::Exit));
        assert!(AlertMode::ExitOnly.fires_on(Direction::Exit));
        assert!(!AlertMode::ExitOnly.fires_on(Direction::Entry));
        assert!(AlertMode::EntryAndExit.fires_on(Direction::Entry));
        assert!(AlertMode::EntryAndExit.fires_on(Direction::Exit));
        assert!(!AlertMode::None.fires_on(Direction::Entry));
        assert!(!AlertMode::None.fires_on(Direction::Exit));
    }

    #[test]
    fn circle_radius_must_be_positive() {
        let shape = GeofenceShape::Circle {
            center: GeoPoint::new(-12.05, -77.04),
            radius_m: 0.0,
        };
        assert!(matches!(shape.validate(), Err(FleetError::Validation { .. })));

        let shape = GeofenceShape::Circle {
            center: GeoPoint::new(-12.05, -77.04),
            radius_m: 250.0,
        };
        assert!(shape.validate().is_ok());
    }

    #[test]
    fn polygon_needs_three_valid_vertices() {
        let two = GeofenceShape::Polygon {
            vertices: vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(1.0, 1.0)],
        };
        assert!(two.validate().is_err());

        let out_of_range = GeofenceShape::Polygon {
            vertices: vec![
                GeoPoint::new(0.0, 0.0),
                GeoPoint::new(1.0, 1.0),
                GeoPoint::new(95.0, 1.0),
            ],
        };
        assert!(out_of_range.validate().is_err());
    }

    #[test]
    fn shape_serializes_as_tagged_object() {
        let shape = GeofenceShape::Circle {
            center: GeoPoint::new(1.5, 2.5),
            radius_m: 100.0,
        };
        let value = serde_json::to_value(&shape).unwrap();
        assert_eq!(value["type"], "circle");
        assert_eq!(value["center"]["lat"], 1.5);
        assert_eq!(value["radius_m"], 100.0);
    }

    #[test]
    fn assignment_scope_keys_are_distinct() {
        let tenant = Uuid::new_v4();
        assert_eq!(AssignmentScope::Global.key(), "global");
        assert_eq!(AssignmentScope::Tenant(tenant).key(), format!("tenant:{tenant}"));
    }
}
