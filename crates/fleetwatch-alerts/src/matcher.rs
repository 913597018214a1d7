//! Recipient matching against stored geofences and preferences.

use fleetwatch_core::error::{FleetError, FleetResult};
use fleetwatch_core::matching::{RecipientMatch, entitlement, match_recipients};
use fleetwatch_core::models::event::GeofenceEvent;
use fleetwatch_core::models::geofence::Geofence;
use fleetwatch_core::models::recipient::{Channel, Recipient};
use fleetwatch_core::repository::{GeofenceRepository, RecipientRepository};
use tracing::{debug, warn};

/// Recipients selected for one event.
#[derive(Debug, Clone, Default)]
pub struct EventMatches {
    /// `None` when the event names a geofence that does not exist.
    pub geofence: Option<Geofence>,
    pub matches: Vec<RecipientMatch>,
}

impl EventMatches {
    /// One `(recipient, channel)` pair per deliverable target.
    pub fn pairs(&self) -> Vec<(&Recipient, Channel)> {
        self.matches
            .iter()
            .flat_map(|m| m.targets.iter().map(move |(channel, _)| (&m.recipient, *channel)))
            .collect()
    }
}

pub struct RecipientMatcher<G: GeofenceRepository, R: RecipientRepository> {
    geofences: G,
    recipients: R,
}

impl<G: GeofenceRepository, R: RecipientRepository> RecipientMatcher<G, R> {
    pub fn new(geofences: G, recipients: R) -> Self {
        Self {
            geofences,
            recipients,
        }
    }

    /// Select every active recipient entitled to and subscribed to
    /// `event`. No match is a valid empty result.
    pub async fn match_event(&self, event: &GeofenceEvent) -> FleetResult<EventMatches> {
        let geofence = match self.geofences.get_by_id(event.geofence_id).await {
            Ok(geofence) => geofence,
            Err(FleetError::NotFound { .. }) => {
                warn!(event_id = %event.id, geofence_id = %event.geofence_id, "Event for unknown geofence");
                return Ok(EventMatches::default());
            }
            Err(e) => return Err(e),
        };

        let scopes: Vec<_> = self
            .geofences
            .assignments(geofence.id)
            .await?
            .into_iter()
            .map(|a| a.scope)
            .collect();

        let entitled = entitlement(&geofence, &scopes);
        if entitled.is_empty() || !geofence.alert_mode.fires_on(event.direction) {
            debug!(event_id = %event.id, "No tenant entitled to event");
            return Ok(EventMatches {
                geofence: Some(geofence),
                matches: Vec::new(),
            });
        }

        let candidates = self.recipients.list_active(&entitled).await?;
        let matches = match_recipients(&geofence, &scopes, event, candidates);
        debug!(event_id = %event.id, matched = matches.len(), "Recipients matched");

        Ok(EventMatches {
            geofence: Some(geofence),
            matches,
        })
    }
}
