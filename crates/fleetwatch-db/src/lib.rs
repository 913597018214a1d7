//! Fleetwatch database layer: SurrealDB connection management, schema
//! migrations and implementations of the `fleetwatch-core` repository
//! traits.

mod connection;
mod error;
mod schema;

pub mod repository;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use repository::{
    SurrealAuditLogRepository, SurrealDeliveryRepository, SurrealEventRepository,
    SurrealGeofenceRepository, SurrealRecipientRepository, SurrealTenantRepository,
};
pub use schema::{run_migrations, schema_v1};
