//! Domain models for fleetwatch.
//!
//! These are the core types shared across all crates.

pub mod audit;
pub mod delivery;
pub mod event;
pub mod geofence;
pub mod recipient;
pub mod tenant;
