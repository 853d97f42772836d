//! The index contract (component D) and its two concrete implementations.
//!
//! Modeled as a trait object rather than an open extension point: spec §9
//! ("pluggable index... exactly two concrete variants; no open extension is
//! required at runtime") calls for a closed set, so [`IndexKind`] names the
//! two variants and [`Store`](crate::store::Store)/[`Library`](crate::library::Library)
//! hold a `Box<dyn Index>` built from whichever kind is requested.

pub mod ball_tree;
pub mod brute_force;

use uuid::Uuid;

use crate::error::Result;

pub use ball_tree::BallTreeIndex;
pub use brute_force::BruteForceIndex;

/// Which concrete index a [`Library`](crate::library::Library) is using.
/// Matches the transport surface's `index_name` field (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum IndexKind {
    BruteForceIndex,
    BallTreeIndex,
}

impl IndexKind {
    pub fn build_empty(self) -> Box<dyn Index> {
        match self {
            IndexKind::BruteForceIndex => Box::new(BruteForceIndex::new(true)),
            IndexKind::BallTreeIndex => Box::new(BallTreeIndex::new(16)),
        }
    }
}

/// `build`/`search` contract shared by [`BruteForceIndex`] and
/// [`BallTreeIndex`] (spec §4.C).
pub trait Index: Send + Sync {
    /// Replace all index state with a fresh build over `vectors`/`ids`.
    /// `vectors.len() == ids.len()`; every vector has the same length.
    /// Idempotent — a later `build` call fully replaces prior state.
    fn build(&mut self, vectors: &[Vec<f32>], ids: &[Uuid]) -> Result<()>;

    /// Top-k nearest neighbors to `query` by cosine similarity, descending.
    /// `k == 0` returns an empty list; `k` greater than the number of
    /// indexed vectors returns all of them. Fails with `NotBuilt` if
    /// `build` has never been called.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Uuid, f32)>>;

    fn kind(&self) -> IndexKind;

    /// Number of vectors currently indexed (0 before any build).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
