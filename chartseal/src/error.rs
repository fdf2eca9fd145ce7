//! Error types for `chartseal` operations.
//!
//! Cryptographic and encoding failures never surface here: the cipher, index,
//! and codec degrade to documented fallback values instead. Only business-rule
//! violations and persistence failures propagate to callers.

use std::fmt;

/// Main error type for `chartseal` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A hospital identifier is already registered (surrogate-layer collision)
    #[error("hospital identifier already in use")]
    IdentifierInUse,

    /// No record matched the lookup
    #[error("no matching record")]
    NotFound,

    /// Identifier/credential pair was rejected
    #[error("invalid hospital identifier or password")]
    InvalidCredentials,

    /// A required field was absent or blank
    #[error("{field} is required")]
    MissingField {
        /// Name of the missing field
        field: &'static str,
    },

    /// Role outside the closed enumeration
    #[error("invalid role: {0}")]
    InvalidRole(String),

    /// Equality lookup requested on a field without a surrogate column
    #[error("field {0} does not support equality lookup")]
    UnsearchableField(&'static str),

    /// Credential hashing or parsing failed
    #[error("credential processing failed: {0}")]
    Credential(String),

    /// Key material could not be produced or parsed
    #[error("key material error: {0}")]
    KeyMaterial(String),

    /// Persistence operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors specific to persistence-layer operations.
#[derive(Debug)]
pub enum StoreError {
    /// A unique constraint rejected the write
    UniqueViolation {
        /// Collection holding the constraint
        collection: String,
        /// Constrained column
        column: String,
    },

    /// Backend-specific failure
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UniqueViolation { collection, column } => {
                write!(f, "unique constraint violated on {collection}.{column}")
            }
            Self::Backend(msg) => write!(f, "backend error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}
