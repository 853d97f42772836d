//! Library (component G): the aggregate root that owns an ordered chunk
//! list and the current index, and drives rebuild-on-mutate.
//!
//! Mirrors `original_source/app/core/Library.py`: `upsert_chunks` replaces
//! in place or appends, `delete_chunks` clears or filters by id, and both
//! rebuild the index afterward using the current index's own kind (falling
//! back to a ball tree when no index has been built yet, matching the
//! Python `self.index.__class__()` / `BallTreeIndex()` fallback).

use std::time::SystemTime;

use uuid::Uuid;

use crate::chunk::Chunk;
use crate::error::{Result, VectorStoreError};
use crate::index::{Index, IndexKind};
use crate::metadata::Metadata;

pub struct Library {
    pub id: Uuid,
    pub name: String,
    pub metadata: Metadata,
    pub created_at: SystemTime,
    /// Required embedding length for every chunk in this library
    /// (invariant L1).
    pub dim: usize,
    chunks: Vec<Chunk>,
    index: Option<Box<dyn Index>>,
}

impl Library {
    pub fn new(name: impl Into<String>, metadata: Metadata, dim: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            metadata,
            created_at: SystemTime::now(),
            dim,
            chunks: Vec::new(),
            index: None,
        }
    }

    /// Upsert (insert or update) chunks. Replaces a chunk with the same id
    /// in place, preserving its position; otherwise appends. All-or-nothing
    /// w.r.t. dimension validation: if any input chunk has the wrong
    /// dimension, no change is applied. An empty input is a no-op — the
    /// index is not touched (spec §4.G).
    pub fn upsert_chunks(&mut self, chunks_to_upsert: Vec<Chunk>, default_kind: IndexKind) -> Result<()> {
        if chunks_to_upsert.is_empty() {
            return Ok(());
        }
        for c in &chunks_to_upsert {
            if c.embedding.len() != self.dim {
                return Err(VectorStoreError::BadDimension {
                    expected: self.dim,
                    got: c.embedding.len(),
                });
            }
        }

        let mut id_to_index = std::collections::HashMap::with_capacity(self.chunks.len());
        for (idx, chunk) in self.chunks.iter().enumerate() {
            id_to_index.insert(chunk.id, idx);
        }

        for chunk in chunks_to_upsert {
            if let Some(&idx) = id_to_index.get(&chunk.id) {
                self.chunks[idx] = chunk;
            } else {
                id_to_index.insert(chunk.id, self.chunks.len());
                self.chunks.push(chunk);
            }
        }

        self.rebuild(default_kind)
    }

    /// Delete chunks. `ids = None` clears the whole library; `Some(ids)`
    /// removes any chunk whose id is in the set. Rebuilds the index
    /// afterward either way (spec §4.G).
    pub fn delete_chunks(&mut self, ids: Option<&[Uuid]>, default_kind: IndexKind) -> Result<()> {
        match ids {
            None => self.chunks.clear(),
            Some(ids) => {
                let remove: std::collections::HashSet<Uuid> = ids.iter().copied().collect();
                self.chunks.retain(|c| !remove.contains(&c.id));
            }
        }
        self.rebuild(default_kind)
    }

    /// Immutable snapshot of the ordered chunk list.
    pub fn get_all_chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Replace the chunk list wholesale and build `kind` over it, even when
    /// `chunks` is empty — unlike `upsert_chunks`, which is a no-op on an
    /// empty input and would leave the index untouched. Used when restoring
    /// a library from a snapshot, where a library that was built-but-empty
    /// at snapshot time must come back built-but-empty, not never-built.
    pub fn restore_chunks(&mut self, chunks: Vec<Chunk>, kind: IndexKind) -> Result<()> {
        for c in &chunks {
            if c.embedding.len() != self.dim {
                return Err(VectorStoreError::BadDimension {
                    expected: self.dim,
                    got: c.embedding.len(),
                });
            }
        }
        self.chunks = chunks;
        self.build_index(kind)
    }

    /// Replace the current index with a freshly built instance of `kind`
    /// over the current chunks.
    pub fn build_index(&mut self, kind: IndexKind) -> Result<()> {
        let mut index = kind.build_empty();
        let vectors: Vec<Vec<f32>> = self.chunks.iter().map(|c| c.embedding.clone()).collect();
        let ids: Vec<Uuid> = self.chunks.iter().map(|c| c.id).collect();
        index.build(&vectors, &ids)?;
        self.index = Some(index);
        Ok(())
    }

    fn rebuild(&mut self, default_kind: IndexKind) -> Result<()> {
        let kind = self.index.as_ref().map(|i| i.kind()).unwrap_or(default_kind);
        self.build_index(kind)
    }

    pub fn index_kind(&self) -> Option<IndexKind> {
        self.index.as_ref().map(|i| i.kind())
    }

    /// Delegate to the current index. Fails with `NotBuilt` if no index has
    /// been built yet (a brand-new library with no explicit `build_index`
    /// call).
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Uuid, f32)>> {
        match &self.index {
            Some(index) => index.search(query, k),
            None => Err(VectorStoreError::NotBuilt),
        }
    }
}
