//! Database-specific error types and conversions.

use fleetwatch_core::error::FleetError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Corrupt row: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Record conflicts with an existing {entity}")]
    Conflict { entity: String },
}

impl DbError {
    pub(crate) fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Classify a failed statement. Unique-index and record-id collisions
    /// become [`DbError::Conflict`].
    pub(crate) fn from_statement(entity: &str, err: surrealdb::Error) -> Self {
        let message = err.to_string();
        if message.contains("already exists") || message.contains("already contains") {
            Self::Conflict {
                entity: entity.into(),
            }
        } else {
            Self::Query(message)
        }
    }
}

impl From<DbError> for FleetError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => FleetError::NotFound { entity, id },
            DbError::Conflict { entity } => FleetError::AlreadyExists { entity },
            other => FleetError::Database(other.to_string()),
        }
    }
}
