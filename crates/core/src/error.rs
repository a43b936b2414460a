use crate::barcode::codec::BarcodeFormatError;
use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid barcode: {0}")]
    InvalidBarcode(#[from] BarcodeFormatError),

    #[error("Entity not found: {entity} {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Duplicate {entity}: {key}")]
    DuplicateKey { entity: &'static str, key: String },

    #[error("Cannot transition {entity} from '{from}' to '{to}'")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Claim {claim_id} was modified concurrently (expected version {expected_version})")]
    ConflictingTransition { claim_id: DbId, expected_version: i64 },

    #[error("Barcode generation exhausted after {attempts} attempts")]
    GenerationExhausted {
        attempts: u32,
        batch_id: Option<DbId>,
    },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a [`CoreError::NotFound`] keyed by a numeric id.
    pub fn not_found(entity: &'static str, id: DbId) -> Self {
        Self::NotFound {
            entity,
            key: id.to_string(),
        }
    }

    /// Whether the caller may retry the operation after re-reading state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConflictingTransition { .. })
    }
}
