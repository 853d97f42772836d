//! Error kinds shared by the library, index, and store layers.

use uuid::Uuid;

/// Failure surface for the whole crate. Variants map 1:1 onto spec §7's
/// error kinds: `NotFound`, `BadDimension`, `BadPredicate`, `NotBuilt`,
/// `IOError`, `Invariant`.
#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("library {0} does not exist")]
    NotFound(Uuid),

    #[error("vector has dimension {got}, expected {expected}")]
    BadDimension { expected: usize, got: usize },

    #[error("invalid predicate for field {field:?}: {reason}")]
    BadPredicate { field: String, reason: &'static str },

    #[error("index has not been built yet")]
    NotBuilt,

    #[error("snapshot I/O failed: {0}")]
    IoError(#[from] std::io::Error),

    #[error("snapshot codec failed: {0}")]
    Codec(#[from] Box<bincode::ErrorKind>),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, VectorStoreError>;
