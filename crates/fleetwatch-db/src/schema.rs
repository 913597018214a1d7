//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as
//! strings and every record id is the entity's UUID. Enums are stored as
//! strings with ASSERT constraints.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "geofence_alerting",
    sql: SCHEMA_V1,
}];

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Tenants
-- =======================================================================
DEFINE TABLE tenant SCHEMAFULL;
DEFINE FIELD name ON TABLE tenant TYPE string;
DEFINE FIELD slug ON TABLE tenant TYPE string;
DEFINE FIELD created_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_tenant_slug ON TABLE tenant COLUMNS slug UNIQUE;

-- =======================================================================
-- Geofences (platform- or tenant-owned, soft-deleted)
-- =======================================================================
DEFINE TABLE geofence SCHEMAFULL;
DEFINE FIELD name ON TABLE geofence TYPE string;
DEFINE FIELD shape ON TABLE geofence TYPE object FLEXIBLE;
DEFINE FIELD owner_kind ON TABLE geofence TYPE string \
    ASSERT $value IN ['Platform', 'Tenant'];
DEFINE FIELD owner_tenant_id ON TABLE geofence TYPE option<string>;
DEFINE FIELD alert_mode ON TABLE geofence TYPE string \
    ASSERT $value IN ['EntryOnly', 'ExitOnly', 'EntryAndExit', 'None'];
DEFINE FIELD entry_message ON TABLE geofence TYPE option<string>;
DEFINE FIELD exit_message ON TABLE geofence TYPE option<string>;
DEFINE FIELD state ON TABLE geofence TYPE string \
    ASSERT $value IN ['Active', 'Deleted'];
DEFINE FIELD deleted_at ON TABLE geofence TYPE option<datetime>;
DEFINE FIELD created_by ON TABLE geofence TYPE string;
DEFINE FIELD created_at ON TABLE geofence TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE geofence TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_geofence_owner ON TABLE geofence \
    COLUMNS owner_kind, owner_tenant_id, state;

-- =======================================================================
-- Geofence assignments (sharing grants for platform geofences)
-- =======================================================================
DEFINE TABLE geofence_assignment SCHEMAFULL;
DEFINE FIELD geofence_id ON TABLE geofence_assignment TYPE string;
DEFINE FIELD scope_key ON TABLE geofence_assignment TYPE string;
DEFINE FIELD tenant_id ON TABLE geofence_assignment TYPE option<string>;
DEFINE FIELD created_at ON TABLE geofence_assignment TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_assignment_geofence_scope ON TABLE geofence_assignment \
    COLUMNS geofence_id, scope_key UNIQUE;

-- =======================================================================
-- Geofence events (one row per dedupe key)
-- =======================================================================
DEFINE TABLE geofence_event SCHEMAFULL;
DEFINE FIELD vehicle_id ON TABLE geofence_event TYPE string;
DEFINE FIELD geofence_id ON TABLE geofence_event TYPE string;
DEFINE FIELD direction ON TABLE geofence_event TYPE string \
    ASSERT $value IN ['Entry', 'Exit'];
DEFINE FIELD lat ON TABLE geofence_event TYPE float;
DEFINE FIELD lon ON TABLE geofence_event TYPE float;
DEFINE FIELD occurred_at ON TABLE geofence_event TYPE datetime;
DEFINE FIELD dedupe_key ON TABLE geofence_event TYPE string;
DEFINE FIELD processed ON TABLE geofence_event TYPE bool DEFAULT false;
DEFINE FIELD claimed_at ON TABLE geofence_event TYPE option<datetime>;
DEFINE FIELD completed_at ON TABLE geofence_event TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE geofence_event TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_event_dedupe_key ON TABLE geofence_event \
    COLUMNS dedupe_key UNIQUE;
DEFINE INDEX idx_event_processed ON TABLE geofence_event \
    COLUMNS processed, created_at;

-- =======================================================================
-- Recipients (tenant scope)
-- =======================================================================
DEFINE TABLE recipient SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE recipient TYPE string;
DEFINE FIELD name ON TABLE recipient TYPE string;
DEFINE FIELD email ON TABLE recipient TYPE option<string>;
DEFINE FIELD messaging_address ON TABLE recipient TYPE option<string>;
DEFINE FIELD channels ON TABLE recipient TYPE array<string>;
DEFINE FIELD alert_types ON TABLE recipient TYPE array<string>;
DEFINE FIELD geofence_ids ON TABLE recipient TYPE option<array<string>>;
DEFINE FIELD vehicle_ids ON TABLE recipient TYPE option<array<string>>;
DEFINE FIELD active ON TABLE recipient TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE recipient TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE recipient TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_recipient_tenant ON TABLE recipient \
    COLUMNS tenant_id, active;

-- =======================================================================
-- Deliveries (one row per event, recipient and channel)
-- =======================================================================
DEFINE TABLE delivery SCHEMAFULL;
DEFINE FIELD event_id ON TABLE delivery TYPE string;
DEFINE FIELD recipient_id ON TABLE delivery TYPE string;
DEFINE FIELD tenant_id ON TABLE delivery TYPE string;
DEFINE FIELD channel ON TABLE delivery TYPE string \
    ASSERT $value IN ['Email', 'Messaging'];
DEFINE FIELD destination ON TABLE delivery TYPE string;
DEFINE FIELD subject ON TABLE delivery TYPE string;
DEFINE FIELD message ON TABLE delivery TYPE string;
DEFINE FIELD status ON TABLE delivery TYPE string \
    ASSERT $value IN ['Pending', 'Sent', 'Failed', 'Skipped'];
DEFINE FIELD error_detail ON TABLE delivery TYPE option<string>;
DEFINE FIELD sent_at ON TABLE delivery TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE delivery TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE delivery TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_delivery_event_recipient_channel ON TABLE delivery \
    COLUMNS event_id, recipient_id, channel UNIQUE;

-- =======================================================================
-- Audit log (append-only)
-- =======================================================================
DEFINE TABLE audit_log SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD actor_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD actor_type ON TABLE audit_log TYPE string \
    ASSERT $value IN ['Operator', 'TenantUser', 'System'];
DEFINE FIELD action ON TABLE audit_log TYPE string;
DEFINE FIELD resource_type ON TABLE audit_log TYPE string;
DEFINE FIELD resource_id ON TABLE audit_log TYPE option<string>;
DEFINE FIELD detail ON TABLE audit_log TYPE object FLEXIBLE DEFAULT {};
DEFINE FIELD ip_address ON TABLE audit_log TYPE option<string>;
DEFINE FIELD user_agent ON TABLE audit_log TYPE option<string>;
DEFINE FIELD timestamp ON TABLE audit_log TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_timestamp ON TABLE audit_log COLUMNS timestamp;
DEFINE INDEX idx_audit_action ON TABLE audit_log COLUMNS action;
";

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates the `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the highest recorded one.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "could not record v{}: {}",
                    migration.version, e,
                ))
            })?;
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(window[0].version < window[1].version);
        }
    }

    #[test]
    fn uniqueness_guards_are_declared() {
        assert!(SCHEMA_V1.contains("COLUMNS dedupe_key UNIQUE"));
        assert!(SCHEMA_V1.contains("COLUMNS geofence_id, scope_key UNIQUE"));
        assert!(SCHEMA_V1.contains("COLUMNS event_id, recipient_id, channel UNIQUE"));
    }

    #[test]
    fn audit_log_forbids_mutation() {
        let audit = SCHEMA_V1
            .split("DEFINE TABLE audit_log")
            .nth(1)
            .unwrap();
        assert!(audit.contains("FOR update NONE"));
        assert!(audit.contains("FOR delete NONE"));
    }
}
