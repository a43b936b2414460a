//! Mapping from `sqlx::Error` to [`CoreError`].

use rex_core::error::CoreError;

/// PostgreSQL `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL `foreign_key_violation`.
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Classify a database error for the store port contract.
///
/// - Unique violations become [`CoreError::DuplicateKey`].
/// - `RowNotFound` and foreign key violations become [`CoreError::NotFound`].
/// - Everything else is logged and reported as
///   [`CoreError::StoreUnavailable`].
pub fn map_db_error(entity: &'static str, key: impl ToString, err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::RowNotFound => CoreError::NotFound {
            entity,
            key: key.to_string(),
        },
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some(UNIQUE_VIOLATION) => CoreError::DuplicateKey {
                entity,
                key: key.to_string(),
            },
            Some(FOREIGN_KEY_VIOLATION) => {
                let constraint = db_err.constraint().unwrap_or("unknown");
                tracing::debug!(constraint, "Foreign key violation");
                CoreError::NotFound {
                    entity,
                    key: key.to_string(),
                }
            }
            _ => {
                tracing::error!(error = %db_err, entity, "Database error");
                CoreError::StoreUnavailable(db_err.to_string())
            }
        },
        other => {
            tracing::error!(error = %other, entity, "Database error");
            CoreError::StoreUnavailable(other.to_string())
        }
    }
}

/// Report a row whose stored value no longer parses into the domain type.
pub fn corrupt_row(entity: &'static str, err: CoreError) -> CoreError {
    tracing::error!(entity, error = %err, "Stored row failed to decode");
    CoreError::Internal(format!("Stored {entity} row is invalid: {err}"))
}
