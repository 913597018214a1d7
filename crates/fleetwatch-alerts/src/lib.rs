//! Fleetwatch alerts: geofence and recipient services, crossing ingestion,
//! recipient matching and notification dispatch.

pub mod audit;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod geofence;
pub mod ingest;
pub mod matcher;
pub mod processor;
pub mod recipient;
pub mod sender;

pub use audit::{Actor, AuditRecorder};
pub use config::{AlertConfig, QueuePolicy};
pub use dispatcher::{Dispatched, Dispatcher};
pub use error::AlertError;
pub use geofence::GeofenceService;
pub use ingest::EventIngestor;
pub use matcher::{EventMatches, RecipientMatcher};
pub use processor::{EventProcessor, ProcessReport};
pub use recipient::RecipientService;
pub use sender::{LogSender, NotificationSender, SendError};
