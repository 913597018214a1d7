//! SurrealDB repository implementations.

mod audit;
mod delivery;
mod event;
mod geofence;
mod recipient;
mod row;
mod tenant;

pub use audit::SurrealAuditLogRepository;
pub use delivery::SurrealDeliveryRepository;
pub use event::SurrealEventRepository;
pub use geofence::SurrealGeofenceRepository;
pub use recipient::SurrealRecipientRepository;
pub use tenant::SurrealTenantRepository;
