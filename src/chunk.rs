//! Chunk: an embedding vector with a stable id and metadata.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metadata::Metadata;

/// Default embedding dimension — OpenAI `text-embedding-ada-002` /
/// `text-embedding-3-small` output size, the reference value from spec §3.
/// Libraries may be built for a different dimension; this is only the
/// default new chunks and libraries pick up when none is specified.
pub const EMBEDDING_DIM: usize = 1536;

/// An identified record: id, embedding, metadata. Immutable after
/// insertion — updates replace the whole record, keyed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

impl Chunk {
    /// Construct a chunk with a freshly generated id.
    pub fn new(text: impl Into<String>, embedding: Vec<f32>, metadata: Metadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            embedding,
            metadata,
        }
    }

    /// Construct a chunk with an explicit id (used on upsert, where the
    /// caller already knows the id it wants to replace or has one supplied
    /// by the embedding pipeline).
    pub fn with_id(id: Uuid, text: impl Into<String>, embedding: Vec<f32>, metadata: Metadata) -> Self {
        Self {
            id,
            text: text.into(),
            embedding,
            metadata,
        }
    }
}
