//! Recipient matching rules.
//!
//! Given an event and its geofence, decide which tenants are entitled to
//! hear about it and which of their recipients subscribe to it.

use std::collections::BTreeSet;

use uuid::Uuid;

use crate::models::event::GeofenceEvent;
use crate::models::geofence::{AssignmentScope, Geofence, GeofenceOwner};
use crate::models::recipient::{Channel, Recipient};

/// Tenants whose recipients may be notified about a geofence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entitlement {
    /// A global assignment entitles every tenant with recipients.
    AllTenants,
    Tenants(BTreeSet<Uuid>),
}

impl Entitlement {
    pub fn includes(&self, tenant_id: Uuid) -> bool {
        match self {
            Entitlement::AllTenants => true,
            Entitlement::Tenants(set) => set.contains(&tenant_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Entitlement::Tenants(set) if set.is_empty())
    }
}

pub fn entitlement(geofence: &Geofence, assignments: &[AssignmentScope]) -> Entitlement {
    if !geofence.state.is_active() {
        return Entitlement::Tenants(BTreeSet::new());
    }
    match geofence.owner {
        GeofenceOwner::Tenant(tenant_id) => Entitlement::Tenants(BTreeSet::from([tenant_id])),
        GeofenceOwner::Platform => {
            if assignments.contains(&AssignmentScope::Global) {
                Entitlement::AllTenants
            } else {
                Entitlement::Tenants(
                    assignments
                        .iter()
                        .filter_map(AssignmentScope::tenant_id)
                        .collect(),
                )
            }
        }
    }
}

/// A recipient selected for an event and the channels it can be reached on.
///
/// `targets` may be empty when every enabled channel lacks an address.
#[derive(Debug, Clone)]
pub struct RecipientMatch {
    pub recipient: Recipient,
    pub targets: Vec<(Channel, String)>,
}

pub fn recipient_matches(
    recipient: &Recipient,
    event: &GeofenceEvent,
    entitlement: &Entitlement,
) -> bool {
    recipient.active
        && entitlement.includes(recipient.tenant_id)
        && recipient.subscribes_to(event.direction)
        && recipient.covers_geofence(event.geofence_id)
        && recipient.covers_vehicle(event.vehicle_id)
}

/// Select the matching recipients among `candidates`.
pub fn match_recipients(
    geofence: &Geofence,
    assignments: &[AssignmentScope],
    event: &GeofenceEvent,
    candidates: Vec<Recipient>,
) -> Vec<RecipientMatch> {
    if !geofence.alert_mode.fires_on(event.direction) {
        return Vec::new();
    }
    let entitlement = entitlement(geofence, assignments);
    if entitlement.is_empty() {
        return Vec::new();
    }
    candidates
        .into_iter()
        .filter(|r| recipient_matches(r, event, &entitlement))
        .map(|recipient| RecipientMatch {
            targets: recipient.deliverable_targets(),
            recipient,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::Direction;
    use crate::models::geofence::{AlertMode, GeoPoint, GeofenceShape, LifecycleState};
    use chrono::Utc;

    fn geofence(owner: GeofenceOwner, alert_mode: AlertMode) -> Geofence {
        Geofence {
            id: Uuid::new_v4(),
            name: "Port gate".into(),
            shape: GeofenceShape::Circle {
                center: GeoPoint::new(-33.0, -71.6),
                radius_m: 300.0,
            },
            owner,
            alert_mode,
            entry_message: None,
            exit_message: None,
            state: LifecycleState::Active,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn event(geofence_id: Uuid, direction: Direction) -> GeofenceEvent {
        GeofenceEvent {
            id: Uuid::new_v4(),
            vehicle_id: Uuid::from_u128(7),
            geofence_id,
            direction,
            location: GeoPoint::new(-33.0, -71.6),
            occurred_at: Utc::now(),
            dedupe_key: "k".into(),
            processed: true,
            claimed_at: Some(Utc::now()),
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    fn recipient(tenant_id: Uuid, alert_types: Vec<Direction>) -> Recipient {
        Recipient {
            id: Uuid::new_v4(),
            tenant_id,
            name: "Control room".into(),
            email: Some("control@example.com".into()),
            messaging_address: None,
            channels: vec![Channel::Email],
            alert_types,
            geofence_ids: None,
            vehicle_ids: None,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn tenant_geofence_entitles_only_owner() {
        let t1 = Uuid::new_v4();
        let g = geofence(GeofenceOwner::Tenant(t1), AlertMode::EntryAndExit);
        let e = entitlement(&g, &[]);
        assert!(e.includes(t1));
        assert!(!e.includes(Uuid::new_v4()));
    }

    #[test]
    fn global_assignment_entitles_everyone() {
        let t1 = Uuid::new_v4();
        let g = geofence(GeofenceOwner::Platform, AlertMode::EntryAndExit);
        let e = entitlement(&g, &[AssignmentScope::Tenant(t1), AssignmentScope::Global]);
        assert_eq!(e, Entitlement::AllTenants);
    }

    #[test]
    fn unassigned_platform_geofence_entitles_nobody() {
        let g = geofence(GeofenceOwner::Platform, AlertMode::EntryAndExit);
        assert!(entitlement(&g, &[]).is_empty());
    }

    #[test]
    fn matches_by_direction_and_tenant() {
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();
        let g = geofence(GeofenceOwner::Tenant(t1), AlertMode::EntryAndExit);
        let candidates = vec![
            recipient(t1, vec![Direction::Entry]),
            recipient(t2, vec![Direction::Entry]),
        ];

        let entry = match_recipients(&g, &[], &event(g.id, Direction::Entry), candidates.clone());
        assert_eq!(entry.len(), 1);
        assert_eq!(entry[0].recipient.tenant_id, t1);

        let exit = match_recipients(&g, &[], &event(g.id, Direction::Exit), candidates);
        assert!(exit.is_empty());
    }

    #[test]
    fn alert_mode_blocks_matching() {
        let t1 = Uuid::new_v4();
        let g = geofence(GeofenceOwner::Tenant(t1), AlertMode::ExitOnly);
        let candidates = vec![recipient(t1, vec![Direction::Entry, Direction::Exit])];
        assert!(match_recipients(&g, &[], &event(g.id, Direction::Entry), candidates.clone()).is_empty());
        assert_eq!(
            match_recipients(&g, &[], &event(g.id, Direction::Exit), candidates).len(),
            1
        );
    }

    #[test]
    fn geofence_allow_list_excludes_other_geofences() {
        let t1 = Uuid::new_v4();
        let g1 = geofence(GeofenceOwner::Tenant(t1), AlertMode::EntryAndExit);
        let g2 = geofence(GeofenceOwner::Tenant(t1), AlertMode::EntryAndExit);
        let mut r = recipient(t1, vec![Direction::Entry]);
        r.geofence_ids = Some(vec![g1.id]);

        assert_eq!(
            match_recipients(&g1, &[], &event(g1.id, Direction::Entry), vec![r.clone()]).len(),
            1
        );
        assert!(match_recipients(&g2, &[], &event(g2.id, Direction::Entry), vec![r]).is_empty());
    }

    #[test]
    fn inactive_recipients_are_ignored() {
        let t1 = Uuid::new_v4();
        let g = geofence(GeofenceOwner::Tenant(t1), AlertMode::EntryAndExit);
        let mut r = recipient(t1, vec![Direction::Entry]);
        r.active = false;
        assert!(match_recipients(&g, &[], &event(g.id, Direction::Entry), vec![r]).is_empty());
    }

    #[test]
    fn recipient_without_address_matches_with_no_targets() {
        let t1 = Uuid::new_v4();
        let g = geofence(GeofenceOwner::Tenant(t1), AlertMode::EntryAndExit);
        let mut r = recipient(t1, vec![Direction::Entry]);
        r.email = None;
        let matches = match_recipients(&g, &[], &event(g.id, Direction::Entry), vec![r]);
        assert_eq!(matches.len(), 1);
        assert!(matches[0].targets.is_empty());
    }
}
