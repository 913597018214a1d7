//! Fleetwatch core: domain models, error taxonomy, repository traits
//! and the pure decision rules for geofence visibility, recipient
//! matching and event deduplication.

pub mod access;
pub mod dedupe;
pub mod error;
pub mod matching;
pub mod message;
pub mod models;
pub mod repository;
pub mod visibility;
