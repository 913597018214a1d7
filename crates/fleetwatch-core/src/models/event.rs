//! Geofence crossing events.
//!
//! Events are produced by the upstream crossing detector, recorded once
//! per dedupe key, and afterwards only mutated by the claim lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::geofence::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Entry => "entry",
            Direction::Exit => "exit",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw crossing fact as reported by the detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCrossing {
    pub vehicle_id: Uuid,
    pub geofence_id: Uuid,
    pub direction: Direction,
    pub location: GeoPoint,
    pub occurred_at: DateTime<Utc>,
}

/// A persisted crossing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceEvent {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub geofence_id: Uuid,
    pub direction: Direction,
    pub location: GeoPoint,
    pub occurred_at: DateTime<Utc>,
    pub dedupe_key: String,
    /// Flipped to `true` when a worker claims the event.
    pub processed: bool,
    pub claimed_at: Option<DateTime<Utc>>,
    /// Set once matching and dispatch finished for the claim.
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Record handed to the repository by the ingestor.
#[derive(Debug, Clone)]
pub struct NewEvent {
    /// Deterministic id derived from the dedupe key.
    pub id: Uuid,
    pub crossing: RawCrossing,
    pub dedupe_key: String,
}

/// Result of an idempotent ingest.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Accepted(GeofenceEvent),
    /// Another report already recorded this crossing.
    Duplicate { event_id: Uuid, dedupe_key: String },
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted(_))
    }

    pub fn event_id(&self) -> Uuid {
        match self {
            IngestOutcome::Accepted(event) => event.id,
            IngestOutcome::Duplicate { event_id, .. } => *event_id,
        }
    }
}
