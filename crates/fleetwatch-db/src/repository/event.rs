//! SurrealDB implementation of [`EventRepository`].
//!
//! Each event is stored under its deterministic id, so the record key and
//! the unique `dedupe_key` index both reject a second copy. Claims are
//! taken with a conditional update on `processed = false`; only the
//! caller whose update touched the row owns the event.

use chrono::{DateTime, Utc};
use fleetwatch_core::error::FleetResult;
use fleetwatch_core::models::event::{Direction, GeofenceEvent, IngestOutcome, NewEvent};
use fleetwatch_core::models::geofence::GeoPoint;
use fleetwatch_core::repository::EventRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{debug, warn};
use uuid::Uuid;

use super::row::{IdRow, parse_uuid, unknown};
use crate::error::DbError;

const EVENT_FIELDS: &str = "meta::id(id) AS record_id, vehicle_id, geofence_id, direction, \
     lat, lon, occurred_at, dedupe_key, processed, claimed_at, completed_at, created_at";

/// Insert attempts before a non-conflict error is surfaced.
const INSERT_ATTEMPTS: usize = 3;

/// Candidates fetched per claim round.
const CLAIM_BATCH: u64 = 8;

pub(crate) fn direction_to_str(direction: Direction) -> &'static str {
    match direction {
        Direction::Entry => "Entry",
        Direction::Exit => "Exit",
    }
}

pub(crate) fn parse_direction(s: &str) -> Result<Direction, DbError> {
    match s {
        "Entry" => Ok(Direction::Entry),
        "Exit" => Ok(Direction::Exit),
        other => Err(unknown("direction", other)),
    }
}

fn is_write_conflict(err: &surrealdb::Error) -> bool {
    let message = err.to_string();
    message.contains("conflict") || message.contains("retried")
}

#[derive(Debug, SurrealValue)]
struct ClaimCandidate {
    record_id: String,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct EventRow {
    record_id: String,
    vehicle_id: String,
    geofence_id: String,
    direction: String,
    lat: f64,
    lon: f64,
    occurred_at: DateTime<Utc>,
    dedupe_key: String,
    processed: bool,
    claimed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl EventRow {
    fn try_into_event(self) -> Result<GeofenceEvent, DbError> {
        Ok(GeofenceEvent {
            id: parse_uuid("event", &self.record_id)?,
            vehicle_id: parse_uuid("vehicle", &self.vehicle_id)?,
            geofence_id: parse_uuid("geofence", &self.geofence_id)?,
            direction: parse_direction(&self.direction)?,
            location: GeoPoint::new(self.lat, self.lon),
            occurred_at: self.occurred_at,
            dedupe_key: self.dedupe_key,
            processed: self.processed,
            claimed_at: self.claimed_at,
            completed_at: self.completed_at,
            created_at: self.created_at,
        })
    }
}

/// SurrealDB implementation of the event store.
#[derive(Clone)]
pub struct SurrealEventRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealEventRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn find_by_dedupe_key(&self, dedupe_key: &str) -> Result<Option<Uuid>, DbError> {
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id FROM geofence_event WHERE dedupe_key = $key")
            .bind(("key", dedupe_key.to_string()))
            .await?;
        let rows: Vec<IdRow> = result.take(0)?;
        rows.first()
            .map(|row| parse_uuid("event", &row.record_id))
            .transpose()
    }

    /// Conditionally flip one event to processed. Returns the event only
    /// if this call took the claim.
    async fn try_claim(&self, id: &str) -> Result<Option<GeofenceEvent>, DbError> {
        let response = self
            .db
            .query(format!(
                "UPDATE type::record('geofence_event', $id) SET \
                 processed = true, claimed_at = time::now() \
                 WHERE processed = false RETURN {EVENT_FIELDS}"
            ))
            .bind(("id", id.to_string()))
            .await?;

        match response.check() {
            Ok(mut result) => {
                let rows: Vec<EventRow> = result.take(0)?;
                rows.into_iter().next().map(EventRow::try_into_event).transpose()
            }
            Err(e) if is_write_conflict(&e) => {
                debug!(event_id = id, "Lost claim race");
                Ok(None)
            }
            Err(e) => Err(DbError::Query(e.to_string())),
        }
    }
}

impl<C: Connection> EventRepository for SurrealEventRepository<C> {
    async fn insert(&self, input: NewEvent) -> FleetResult<IngestOutcome> {
        let crossing = &input.crossing;
        let mut last_error = None;

        for attempt in 1..=INSERT_ATTEMPTS {
            let response = self
                .db
                .query(format!(
                    "CREATE type::record('geofence_event', $id) SET \
                     vehicle_id = $vehicle_id, geofence_id = $geofence_id, \
                     direction = $direction, lat = $lat, lon = $lon, \
                     occurred_at = $occurred_at, dedupe_key = $dedupe_key, \
                     processed = false \
                     RETURN {EVENT_FIELDS}"
                ))
                .bind(("id", input.id.to_string()))
                .bind(("vehicle_id", crossing.vehicle_id.to_string()))
                .bind(("geofence_id", crossing.geofence_id.to_string()))
                .bind(("direction", direction_to_str(crossing.direction).to_string()))
                .bind(("lat", crossing.location.lat))
                .bind(("lon", crossing.location.lon))
                .bind(("occurred_at", crossing.occurred_at))
                .bind(("dedupe_key", input.dedupe_key.clone()))
                .await
                .map_err(DbError::from)?;

            match response.check() {
                Ok(mut result) => {
                    let rows: Vec<EventRow> = result.take(0).map_err(DbError::from)?;
                    let row = rows
                        .into_iter()
                        .next()
                        .ok_or_else(|| DbError::not_found("geofence_event", input.id))?;
                    return Ok(IngestOutcome::Accepted(row.try_into_event()?));
                }
                Err(e) => {
                    // Whatever the failure, an existing row with this key
                    // means a concurrent or earlier insert won.
                    if let Some(event_id) = self.find_by_dedupe_key(&input.dedupe_key).await? {
                        return Ok(IngestOutcome::Duplicate {
                            event_id,
                            dedupe_key: input.dedupe_key,
                        });
                    }
                    warn!(attempt, error = %e, "Event insert failed");
                    last_error = Some(DbError::from_statement("geofence_event", e));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| DbError::Query("event insert failed".into()))
            .into())
    }

    async fn get_by_id(&self, id: Uuid) -> FleetResult<GeofenceEvent> {
        let mut result = self
            .db
            .query(format!(
                "SELECT {EVENT_FIELDS} FROM type::record('geofence_event', $id)"
            ))
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<EventRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("geofence_event", id))?;
        Ok(row.try_into_event()?)
    }

    async fn claim_next(&self) -> FleetResult<Option<GeofenceEvent>> {
        loop {
            let mut result = self
                .db
                .query(
                    "SELECT meta::id(id) AS record_id, created_at FROM geofence_event \
                     WHERE processed = false ORDER BY created_at ASC LIMIT $limit",
                )
                .bind(("limit", CLAIM_BATCH))
                .await
                .map_err(DbError::from)?;
            let candidates: Vec<ClaimCandidate> = result.take(0).map_err(DbError::from)?;
            if candidates.is_empty() {
                return Ok(None);
            }

            for candidate in &candidates {
                if let Some(event) = self.try_claim(&candidate.record_id).await? {
                    debug!(event_id = %event.id, "Claimed event");
                    return Ok(Some(event));
                }
            }
            // Every candidate was taken by another worker; look again.
        }
    }

    async fn complete(&self, id: Uuid) -> FleetResult<()> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('geofence_event', $id) SET completed_at = time::now() \
                 WHERE processed = true RETURN meta::id(id) AS record_id",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::not_found("claimed geofence_event", id).into());
        }
        Ok(())
    }

    async fn release(&self, id: Uuid) -> FleetResult<()> {
        self.db
            .query(
                "UPDATE type::record('geofence_event', $id) SET \
                 processed = false, claimed_at = NONE \
                 WHERE processed = true AND completed_at IS NONE",
            )
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::from_statement("geofence_event", e))?;
        Ok(())
    }

    async fn release_stale_claims(&self, claimed_before: DateTime<Utc>) -> FleetResult<u64> {
        let mut result = self
            .db
            .query(
                "UPDATE geofence_event SET processed = false, claimed_at = NONE \
                 WHERE processed = true AND completed_at IS NONE \
                 AND claimed_at < $before \
                 RETURN meta::id(id) AS record_id",
            )
            .bind(("before", claimed_before))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.len() as u64)
    }

    async fn list_unprocessed(&self, limit: u64) -> FleetResult<Vec<GeofenceEvent>> {
        let mut result = self
            .db
            .query(format!(
                "SELECT {EVENT_FIELDS} FROM geofence_event \
                 WHERE processed = false ORDER BY created_at ASC LIMIT $limit"
            ))
            .bind(("limit", limit))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<EventRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .map(EventRow::try_into_event)
            .collect::<Result<Vec<_>, DbError>>()?)
    }
}
