//! Helpers shared by the row structs of every repository.

use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// Projection of just the record key, used to detect whether a
/// conditional write touched anything.
#[derive(Debug, SurrealValue)]
pub(crate) struct IdRow {
    pub record_id: String,
}

#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub total: u64,
}

pub(crate) fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::Decode(format!("invalid {field} UUID '{raw}': {e}")))
}

pub(crate) fn parse_uuids(field: &str, raw: Vec<String>) -> Result<Vec<Uuid>, DbError> {
    raw.iter().map(|s| parse_uuid(field, s)).collect()
}

pub(crate) fn uuid_strings(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(Uuid::to_string).collect()
}

pub(crate) fn unknown(kind: &str, value: &str) -> DbError {
    DbError::Decode(format!("unknown {kind}: {value}"))
}
