//! # abkve — an in-memory vector database
//!
//! Stores collections of fixed-dimension embedding vectors grouped into
//! named libraries, supports insert/update/delete with metadata predicate
//! filters, and answers top-k nearest-neighbor queries with one of two
//! pluggable index structures: an exhaustive cosine scan
//! ([`BruteForceIndex`](index::BruteForceIndex)) or a cosine-metric ball
//! tree with triangle-inequality pruning
//! ([`BallTreeIndex`](index::BallTreeIndex)). State persists to a local
//! snapshot file on a timer so a restart recovers the last durable image.
//!
//! ## Memory layout
//!
//! Both indexes store vectors as a single flat `Vec<f32>` (vector `i` at
//! `data[i*dim .. (i+1)*dim]`) rather than `Vec<Vec<f32>>`: the search loop
//! walks one contiguous allocation instead of chasing a pointer per row,
//! and the shared dot product ([`vector::dot_product_unrolled`]) is
//! hand-unrolled 8-wide to match one 256-bit AVX2 `VFMADD231PS` per
//! iteration.
//!
//! ## Concurrency
//!
//! [`Store`] holds one global lock for whole-store operations (list/create/
//! delete library, snapshot) and one lock per library for chunk mutation
//! and search. Both are the writer-preferring [`rwlock::RwLock`] rather
//! than `parking_lot::RwLock`'s eventually-fair default, so a steady stream
//! of queries cannot starve the periodic snapshot writer.

// Global allocator: mimalloc's per-thread size-segregated free lists make
// small allocations (chunk ids, metadata entries, index rebuild scratch)
// close to contention-free, which matters here since library mutation
// rebuilds its whole index on every call.
use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod chunk;
pub mod error;
pub mod filter;
pub mod index;
pub mod library;
pub mod metadata;
pub mod rwlock;
pub mod store;
pub mod vector;

pub use chunk::{Chunk, EMBEDDING_DIM};
pub use error::{Result, VectorStoreError};
pub use filter::{Condition, Filter};
pub use index::{BallTreeIndex, BruteForceIndex, Index, IndexKind};
pub use library::Library;
pub use metadata::{Metadata, MetadataValue};
pub use store::{LibrarySummary, Store};
