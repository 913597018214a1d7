//! Dedupe keys for crossing events.
//!
//! The key hashes `(vehicle, geofence, direction, window)` where the
//! window is `occurred_at` truncated to a fixed number of seconds. Two
//! reports of the same crossing inside one window collapse into a single
//! event.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::event::RawCrossing;

/// Namespace for event ids derived from dedupe keys.
const EVENT_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6d1f_3c2a_9b4e_4f0a_8e21_57c4_0b9d_e311);

/// Truncate a timestamp to the start of its window.
pub fn window_start(occurred_at: DateTime<Utc>, window_secs: u64) -> i64 {
    let secs = occurred_at.timestamp();
    let window = window_secs.max(1) as i64;
    secs.div_euclid(window) * window
}

/// Hex-encoded SHA-256 dedupe key for a crossing.
pub fn dedupe_key(crossing: &RawCrossing, window_secs: u64) -> String {
    let window = window_start(crossing.occurred_at, window_secs);
    let mut hasher = Sha256::new();
    hasher.update(crossing.vehicle_id.as_bytes());
    hasher.update(crossing.geofence_id.as_bytes());
    hasher.update(crossing.direction.as_str().as_bytes());
    hasher.update(window.to_be_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic event id for a dedupe key.
pub fn event_id(dedupe_key: &str) -> Uuid {
    Uuid::new_v5(&EVENT_ID_NAMESPACE, dedupe_key.as_bytes())
}
