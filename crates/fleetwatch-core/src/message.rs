//! Alert message rendering.
//!
//! Templates may use `{geofence}`, `{vehicle}`, `{direction}`, `{time}`,
//! `{lat}` and `{lon}`. Unknown placeholders are left as-is.

use crate::models::event::{Direction, GeofenceEvent};
use crate::models::geofence::Geofence;

pub const DEFAULT_ENTRY_TEMPLATE: &str =
    "Vehicle {vehicle} entered {geofence} at {time} ({lat}, {lon})";
pub const DEFAULT_EXIT_TEMPLATE: &str =
    "Vehicle {vehicle} left {geofence} at {time} ({lat}, {lon})";

/// Rendered subject and body for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub body: String,
}

pub fn render(
    geofence: &Geofence,
    event: &GeofenceEvent,
    default_entry: &str,
    default_exit: &str,
) -> RenderedMessage {
    let template = geofence
        .message_template(event.direction)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(match event.direction {
            Direction::Entry => default_entry,
            Direction::Exit => default_exit,
        });

    let body = template
        .replace("{geofence}", &geofence.name)
        .replace("{vehicle}", &event.vehicle_id.to_string())
        .replace("{direction}", event.direction.as_str())
        .replace("{time}", &event.occurred_at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .replace("{lat}", &format!("{:.6}", event.location.lat))
        .replace("{lon}", &format!("{:.6}", event.location.lon));

    RenderedMessage {
        subject: format!("Geofence {}: {}", event.direction, geofence.name),
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::geofence::{AlertMode, GeoPoint, GeofenceOwner, GeofenceShape, LifecycleState};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn fixtures(entry_message: Option<&str>) -> (Geofence, GeofenceEvent) {
        let geofence = Geofence {
            id: Uuid::new_v4(),
            name: "North depot".into(),
            shape: GeofenceShape::Circle {
                center: GeoPoint::new(1.0, 2.0),
                radius_m: 10.0,
            },
            owner: GeofenceOwner::Platform,
            alert_mode: AlertMode::EntryAndExit,
            entry_message: entry_message.map(str::to_string),
            exit_message: None,
            state: LifecycleState::Active,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let event = GeofenceEvent {
            id: Uuid::new_v4(),
            vehicle_id: Uuid::from_u128(42),
            geofence_id: geofence.id,
            direction: Direction::Entry,
            location: GeoPoint::new(1.5, 2.25),
            occurred_at: Utc.with_ymd_and_hms(2026, 5, 4, 8, 30, 0).unwrap(),
            dedupe_key: "k".into(),
            processed: true,
            claimed_at: None,
            completed_at: None,
            created_at: Utc::now(),
        };
        (geofence, event)
    }

    #[test]
    fn custom_template_is_used() {
        let (g, e) = fixtures(Some("{direction} at {geofence} on {time}"));
        let msg = render(&g, &e, DEFAULT_ENTRY_TEMPLATE, DEFAULT_EXIT_TEMPLATE);
        assert_eq!(msg.body, "entry at North depot on 2026-05-04 08:30:00 UTC");
        assert_eq!(msg.subject, "Geofence entry: North depot");
    }

    #[test]
    fn blank_template_falls_back_to_default() {
        let (g, e) = fixtures(Some("   "));
        let msg = render(&g, &e, DEFAULT_ENTRY_TEMPLATE, DEFAULT_EXIT_TEMPLATE);
        assert!(msg.body.starts_with("Vehicle 00000000-0000-0000-0000-00000000002a entered North depot"));
        assert!(msg.body.ends_with("(1.500000, 2.250000)"));
    }
}
