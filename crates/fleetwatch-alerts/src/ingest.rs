//! Event ingestion: record each crossing once per dedupe window.

use fleetwatch_core::dedupe;
use fleetwatch_core::error::FleetResult;
use fleetwatch_core::models::event::{IngestOutcome, NewEvent, RawCrossing};
use fleetwatch_core::repository::EventRepository;
use tracing::{debug, info};

pub struct EventIngestor<E: EventRepository> {
    events: E,
    window_secs: u64,
}

impl<E: EventRepository> EventIngestor<E> {
    pub fn new(events: E, window_secs: u64) -> Self {
        Self {
            events,
            window_secs,
        }
    }

    /// Persist a crossing. A repeat inside the dedupe window is reported
    /// as [`IngestOutcome::Duplicate`], which is a success.
    pub async fn ingest(&self, crossing: RawCrossing) -> FleetResult<IngestOutcome> {
        crossing.location.validate()?;

        let dedupe_key = dedupe::dedupe_key(&crossing, self.window_secs);
        let input = NewEvent {
            id: dedupe::event_id(&dedupe_key),
            crossing,
            dedupe_key,
        };
        let vehicle_id = input.crossing.vehicle_id;
        let geofence_id = input.crossing.geofence_id;

        let outcome = self.events.insert(input).await?;
        match &outcome {
            IngestOutcome::Accepted(event) => info!(
                event_id = %event.id,
                %vehicle_id,
                %geofence_id,
                direction = %event.direction,
                "Crossing recorded"
            ),
            IngestOutcome::Duplicate { event_id, .. } => debug!(
                %event_id,
                %vehicle_id,
                %geofence_id,
                "Duplicate crossing ignored"
            ),
        }
        Ok(outcome)
    }
}
