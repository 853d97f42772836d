//! Store: the process-wide aggregate of libraries plus concurrency and
//! persistence machinery.
//!
//! Lock discipline: whole-store operations (list/create/delete library,
//! snapshot read/write) take the global lock; single-library reads/writes
//! take that library's own lock. Snapshot writes take the global write
//! lock and then every per-library write lock, in that order, releasing in
//! reverse, so the serialized image is coherent.
//!
//! Every `LibraryEntry`'s data is additionally held in a
//! `parking_lot::RwLock` so the actual field access is safe, ordinary Rust
//! borrowing — the bespoke [`crate::rwlock::RwLock`] above it is what
//! supplies the writer-preference *ordering* guarantee. Because callers
//! always acquire the bespoke guard before touching the inner
//! `parking_lot::RwLock` in the matching mode, the inner lock never sees
//! contention the outer guard didn't already resolve — it's a safe vehicle
//! for interior mutability, not a second point of blocking.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::chunk::Chunk;
use crate::error::{Result, VectorStoreError};
use crate::filter::Filter;
use crate::index::IndexKind;
use crate::library::Library;
use crate::metadata::Metadata;
use crate::rwlock::RwLock;

/// Default env var pointing at the snapshot file.
pub const SNAPSHOT_PATH_ENV: &str = "SNAPSHOT_PATH";
const DEFAULT_SNAPSHOT_PATH: &str = "./vectorstore_snapshot.pkl";
const DEFAULT_SNAPSHOT_INTERVAL_SECS: u64 = 10;

/// Transport-facing summary of a library: id, name, metadata, and the
/// index kind currently built for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarySummary {
    pub id: Uuid,
    pub name: String,
    pub metadata: Metadata,
    pub index_kind: Option<IndexKind>,
    pub chunk_count: usize,
}

struct LibraryState {
    library: Library,
    chunk_lookup: HashMap<Uuid, Chunk>,
}

struct LibraryEntry {
    lock: RwLock,
    state: parking_lot::RwLock<LibraryState>,
}

#[derive(Serialize, Deserialize)]
struct LibrarySnapshot {
    id: Uuid,
    name: String,
    metadata: Metadata,
    created_at: SystemTime,
    dim: usize,
    index_kind: IndexKind,
    chunks: Vec<Chunk>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotData {
    libraries: Vec<LibrarySnapshot>,
    chunk_lookup: HashMap<Uuid, HashMap<Uuid, Chunk>>,
}

pub struct Store {
    global: RwLock,
    libraries: parking_lot::RwLock<HashMap<Uuid, Arc<LibraryEntry>>>,
    default_index_kind: IndexKind,
    dim: usize,
    snapshot_path: PathBuf,
    snapshot_interval: Duration,
}

impl Store {
    fn empty(default_index_kind: IndexKind, dim: usize) -> Self {
        let snapshot_path = std::env::var(SNAPSHOT_PATH_ENV)
            .unwrap_or_else(|_| DEFAULT_SNAPSHOT_PATH.to_string())
            .into();
        Self {
            global: RwLock::new(),
            libraries: parking_lot::RwLock::new(HashMap::new()),
            default_index_kind,
            dim,
            snapshot_path,
            snapshot_interval: Duration::from_secs(DEFAULT_SNAPSHOT_INTERVAL_SECS),
        }
    }

    /// Asynchronous factory: attempts to load a snapshot from
    /// `SNAPSHOT_PATH`, starting empty on a missing or corrupt file (never
    /// crashes), then spawns the background snapshot task.
    pub async fn create(default_index_kind: IndexKind, dim: usize) -> Arc<Self> {
        let store = Arc::new(Self::empty(default_index_kind, dim));
        store.load_from_disk().await;
        store.clone().spawn_snapshot_loop();
        store
    }

    /// Create a store with an explicit snapshot interval, for tests that
    /// don't want to wait 10 real seconds for a cycle.
    pub async fn create_with_interval(
        default_index_kind: IndexKind,
        dim: usize,
        interval: Duration,
    ) -> Arc<Self> {
        let mut store = Self::empty(default_index_kind, dim);
        store.snapshot_interval = interval;
        let store = Arc::new(store);
        store.load_from_disk().await;
        store.clone().spawn_snapshot_loop();
        store
    }

    fn spawn_snapshot_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.snapshot_interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if let Err(e) = self.save_to_disk().await {
                    tracing::error!(error = %e, "snapshot write failed");
                } else {
                    tracing::debug!("snapshot written");
                }
            }
        });
    }

    // ---- whole-store operations (global lock) ----

    pub fn list_libraries(&self) -> Vec<LibrarySummary> {
        let _guard = self.global.read();
        self.libraries
            .read()
            .values()
            .map(|entry| {
                let state = entry.state.read();
                LibrarySummary {
                    id: state.library.id,
                    name: state.library.name.clone(),
                    metadata: state.library.metadata.clone(),
                    index_kind: state.library.index_kind(),
                    chunk_count: state.library.get_all_chunks().len(),
                }
            })
            .collect()
    }

    pub fn create_library(
        &self,
        name: impl Into<String>,
        metadata: Metadata,
        index_kind: Option<IndexKind>,
    ) -> Result<Uuid> {
        let _guard = self.global.write();
        let mut library = Library::new(name, metadata, self.dim);
        library.build_index(index_kind.unwrap_or(self.default_index_kind))?;
        let id = library.id;
        let entry = Arc::new(LibraryEntry {
            lock: RwLock::new(),
            state: parking_lot::RwLock::new(LibraryState {
                library,
                chunk_lookup: HashMap::new(),
            }),
        });
        self.libraries.write().insert(id, entry);
        Ok(id)
    }

    pub fn delete_library(&self, id: Uuid) -> Result<()> {
        let _guard = self.global.write();
        self.libraries
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(VectorStoreError::NotFound(id))
    }

    pub fn library_exists(&self, id: Uuid) -> bool {
        let _guard = self.global.read();
        self.libraries.read().contains_key(&id)
    }

    fn entry(&self, id: Uuid) -> Result<Arc<LibraryEntry>> {
        self.libraries
            .read()
            .get(&id)
            .cloned()
            .ok_or(VectorStoreError::NotFound(id))
    }

    // ---- single-library reads (per-library read lock) ----

    pub fn get_all_chunks(&self, id: Uuid) -> Result<Vec<Chunk>> {
        let entry = self.entry(id)?;
        let _guard = entry.lock.read();
        let chunks = entry.state.read().library.get_all_chunks().to_vec();
        Ok(chunks)
    }

    pub fn count_chunks(&self, id: Uuid) -> Result<usize> {
        let entry = self.entry(id)?;
        let _guard = entry.lock.read();
        let count = entry.state.read().library.get_all_chunks().len();
        Ok(count)
    }

    /// Search, then apply `filter` post-hoc: the index returns its k hits
    /// first, and the filter is applied after, so the result may have
    /// fewer than `k` entries.
    pub fn search(
        &self,
        id: Uuid,
        query: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<(Chunk, f32)>> {
        let entry = self.entry(id)?;
        let _guard = entry.lock.read();
        let state = entry.state.read();
        let hits = state.library.search(query, k)?;
        let mut results = Vec::with_capacity(hits.len());
        for (chunk_id, score) in hits {
            let chunk = state
                .chunk_lookup
                .get(&chunk_id)
                .cloned()
                .ok_or(VectorStoreError::NotBuilt)?;
            if filter.map(|f| f.passes(&chunk.metadata)).unwrap_or(true) {
                results.push((chunk, score));
            }
        }
        Ok(results)
    }

    // ---- single-library writes (per-library write lock) ----

    /// Upsert chunks, optionally restricted to those whose metadata passes
    /// `filter` (others are silently dropped). Returns the chunks actually
    /// written.
    pub fn upsert_chunks(
        &self,
        id: Uuid,
        chunks: Vec<Chunk>,
        filter: Option<&Filter>,
    ) -> Result<Vec<Chunk>> {
        let entry = self.entry(id)?;
        let _guard = entry.lock.write();
        let mut state = entry.state.write();

        let to_write: Vec<Chunk> = match filter {
            Some(f) => chunks.into_iter().filter(|c| f.passes(&c.metadata)).collect(),
            None => chunks,
        };

        state.library.upsert_chunks(to_write.clone(), self.default_index_kind)?;
        refresh_lookup(&mut state);
        Ok(to_write)
    }

    /// Delete chunks. `filter = None` deletes all; otherwise deletes every
    /// chunk whose metadata passes the filter. Returns the number deleted.
    pub fn delete_chunks(&self, id: Uuid, filter: Option<&Filter>) -> Result<usize> {
        let entry = self.entry(id)?;
        let _guard = entry.lock.write();
        let mut state = entry.state.write();

        let deleted = match filter {
            None => {
                let count = state.library.get_all_chunks().len();
                state.library.delete_chunks(None, self.default_index_kind)?;
                count
            }
            Some(f) => {
                let ids: Vec<Uuid> = state
                    .library
                    .get_all_chunks()
                    .iter()
                    .filter(|c| f.passes(&c.metadata))
                    .map(|c| c.id)
                    .collect();
                let count = ids.len();
                if !ids.is_empty() {
                    state.library.delete_chunks(Some(&ids), self.default_index_kind)?;
                }
                count
            }
        };
        refresh_lookup(&mut state);
        Ok(deleted)
    }

    // ---- snapshot engine ----

    /// Serialize `{libraries, chunk_lookup}` and atomically replace
    /// `SNAPSHOT_PATH`. Takes the global write lock, then every
    /// per-library write lock (in map order), serializes, then releases in
    /// reverse.
    pub async fn save_to_disk(&self) -> Result<()> {
        let _global_guard = self.global.write();
        let entries: Vec<Arc<LibraryEntry>> = self.libraries.read().values().cloned().collect();
        let _write_guards: Vec<_> = entries.iter().map(|e| e.lock.write()).collect();

        let mut libraries = Vec::with_capacity(entries.len());
        let mut chunk_lookup = HashMap::with_capacity(entries.len());
        for entry in &entries {
            let state = entry.state.read();
            libraries.push(LibrarySnapshot {
                id: state.library.id,
                name: state.library.name.clone(),
                metadata: state.library.metadata.clone(),
                created_at: state.library.created_at,
                dim: state.library.dim,
                index_kind: state.library.index_kind().unwrap_or(self.default_index_kind),
                chunks: state.library.get_all_chunks().to_vec(),
            });
            chunk_lookup.insert(state.library.id, state.chunk_lookup.clone());
        }

        let payload = bincode::serialize(&SnapshotData { libraries, chunk_lookup })?;

        let tmp_path = tmp_path(&self.snapshot_path);
        tokio::fs::write(&tmp_path, &payload).await?;
        tokio::fs::rename(&tmp_path, &self.snapshot_path).await?;
        Ok(())
    }

    /// Load a snapshot from `SNAPSHOT_PATH`. Missing file: start empty.
    /// Corrupt file: log and start empty (spec §7 — never crash). Takes the
    /// global write lock before replacing the map, the same discipline
    /// `save_to_disk` uses (spec §4.I).
    async fn load_from_disk(&self) {
        let bytes = match tokio::fs::read(&self.snapshot_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                tracing::warn!(error = %e, "snapshot read failed, starting empty");
                return;
            }
        };

        let data: SnapshotData = match bincode::deserialize(&bytes) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "snapshot corrupt, starting empty");
                return;
            }
        };

        let _guard = self.global.write();
        let mut libraries = self.libraries.write();
        for snap in data.libraries {
            let mut library = Library::new(snap.name, snap.metadata, snap.dim);
            library.id = snap.id;
            library.created_at = snap.created_at;
            if let Err(e) = library.restore_chunks(snap.chunks, snap.index_kind) {
                tracing::warn!(error = %e, library = %snap.id, "snapshot library failed to rebuild, skipping");
                continue;
            }
            let chunk_lookup = data.chunk_lookup.get(&snap.id).cloned().unwrap_or_default();
            libraries.insert(
                snap.id,
                Arc::new(LibraryEntry {
                    lock: RwLock::new(),
                    state: parking_lot::RwLock::new(LibraryState { library, chunk_lookup }),
                }),
            );
        }
    }

    /// Load a snapshot from an explicit path, bypassing `SNAPSHOT_PATH` —
    /// used by round-trip tests that don't want to touch the environment.
    /// Takes the global write lock before replacing the map, matching
    /// `save_to_disk`'s locking discipline (spec §4.I).
    pub async fn load_from_path(&self, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let data: SnapshotData = bincode::deserialize(&bytes)?;
        let _guard = self.global.write();
        let mut libraries = self.libraries.write();
        libraries.clear();
        for snap in data.libraries {
            let mut library = Library::new(snap.name, snap.metadata, snap.dim);
            library.id = snap.id;
            library.created_at = snap.created_at;
            library.restore_chunks(snap.chunks, snap.index_kind)?;
            let chunk_lookup = data.chunk_lookup.get(&snap.id).cloned().unwrap_or_default();
            libraries.insert(
                snap.id,
                Arc::new(LibraryEntry {
                    lock: RwLock::new(),
                    state: parking_lot::RwLock::new(LibraryState { library, chunk_lookup }),
                }),
            );
        }
        Ok(())
    }
}

fn refresh_lookup(state: &mut LibraryState) {
    state.chunk_lookup = state
        .library
        .get_all_chunks()
        .iter()
        .map(|c| (c.id, c.clone()))
        .collect();
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".tmp");
    PathBuf::from(s)
}

/// Process-wide singleton, constructed under a one-shot initialization
/// lock on first access (spec §4.I).
static SINGLETON: OnceCell<Arc<Store>> = OnceCell::const_new();

/// Get (or lazily create) the process-wide `Store` singleton.
pub async fn singleton() -> Arc<Store> {
    SINGLETON
        .get_or_init(|| async { Store::create(IndexKind::BruteForceIndex, crate::chunk::EMBEDDING_DIM).await })
        .await
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Condition;
    use std::collections::BTreeMap;

    async fn fresh_store() -> Arc<Store> {
        Store::create_with_interval(IndexKind::BruteForceIndex, 4, Duration::from_secs(3600)).await
    }

    #[tokio::test]
    async fn create_then_list_then_delete_library() {
        let store = fresh_store().await;
        let id = store.create_library("lib", Metadata::new(), None).unwrap();
        assert!(store.library_exists(id));
        let listed = store.list_libraries();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);

        store.delete_library(id).unwrap();
        assert!(!store.library_exists(id));
    }

    #[tokio::test]
    async fn delete_unknown_library_is_not_found() {
        let store = fresh_store().await;
        let err = store.delete_library(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, VectorStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn upsert_then_search_then_join_back_to_chunk() {
        let store = fresh_store().await;
        let id = store.create_library("lib", Metadata::new(), None).unwrap();
        let chunk = Chunk::new("hello", vec![1.0, 0.0, 0.0, 0.0], Metadata::new());
        let written = store.upsert_chunks(id, vec![chunk.clone()], None).unwrap();
        assert_eq!(written.len(), 1);

        let results = store.search(id, &[1.0, 0.0, 0.0, 0.0], 5, None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.text, "hello");
    }

    #[tokio::test]
    async fn upsert_with_filter_drops_non_matching_chunks() {
        let store = fresh_store().await;
        let id = store.create_library("lib", Metadata::new(), None).unwrap();

        let mut meta_pass = Metadata::new();
        meta_pass.insert("kind".into(), "keep".into());
        let mut meta_fail = Metadata::new();
        meta_fail.insert("kind".into(), "drop".into());

        let a = Chunk::new("a", vec![1.0, 0.0, 0.0, 0.0], meta_pass);
        let b = Chunk::new("b", vec![0.0, 1.0, 0.0, 0.0], meta_fail);

        let mut conds = BTreeMap::new();
        conds.insert(
            "kind".to_string(),
            Condition {
                eq: Some("keep".into()),
                ..Default::default()
            },
        );
        let filter = Filter::new(conds).unwrap();

        let written = store.upsert_chunks(id, vec![a.clone(), b], Some(&filter)).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].id, a.id);
        assert_eq!(store.count_chunks(id).unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_by_filter_removes_only_matching() {
        let store = fresh_store().await;
        let id = store.create_library("lib", Metadata::new(), None).unwrap();

        let mut meta_a = Metadata::new();
        meta_a.insert("priority".into(), 8i64.into());
        let mut meta_b = Metadata::new();
        meta_b.insert("priority".into(), 3i64.into());
        let mut meta_c = Metadata::new();
        meta_c.insert("priority".into(), 5i64.into());

        store
            .upsert_chunks(
                id,
                vec![
                    Chunk::new("a", vec![0.0; 4], meta_a),
                    Chunk::new("b", vec![0.0; 4], meta_b.clone()),
                    Chunk::new("c", vec![0.0; 4], meta_c),
                ],
                None,
            )
            .unwrap();

        let mut conds = BTreeMap::new();
        conds.insert(
            "priority".to_string(),
            Condition {
                gte: Some(5i64.into()),
                ..Default::default()
            },
        );
        let filter = Filter::new(conds).unwrap();
        let deleted = store.delete_chunks(id, Some(&filter)).unwrap();
        assert_eq!(deleted, 2);

        let remaining = store.get_all_chunks(id).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].metadata, meta_b);
    }

    /// Serialize `store`'s current contents the same way `save_to_disk`
    /// would, without going through the env-configured `SNAPSHOT_PATH`.
    fn snapshot_payload(store: &Store) -> Vec<u8> {
        let entries: Vec<Arc<LibraryEntry>> = store.libraries.read().values().cloned().collect();
        let mut libraries = Vec::new();
        let mut chunk_lookup = HashMap::new();
        for entry in &entries {
            let state = entry.state.read();
            libraries.push(LibrarySnapshot {
                id: state.library.id,
                name: state.library.name.clone(),
                metadata: state.library.metadata.clone(),
                created_at: state.library.created_at,
                dim: state.library.dim,
                index_kind: state.library.index_kind().unwrap(),
                chunks: state.library.get_all_chunks().to_vec(),
            });
            chunk_lookup.insert(state.library.id, state.chunk_lookup.clone());
        }
        bincode::serialize(&SnapshotData { libraries, chunk_lookup }).unwrap()
    }

    #[tokio::test]
    async fn snapshot_round_trip_restores_chunks() {
        let store = fresh_store().await;
        let id = store.create_library("X", Metadata::new(), None).unwrap();
        let a = Chunk::new("a", vec![1.0, 0.0, 0.0, 0.0], Metadata::new());
        let b = Chunk::new("b", vec![0.0, 1.0, 0.0, 0.0], Metadata::new());
        store.upsert_chunks(id, vec![a.clone(), b.clone()], None).unwrap();

        let dir = tempfile_dir();
        let path = dir.join("snap.bin");
        tokio::fs::write(&path, snapshot_payload(&store)).await.unwrap();

        let fresh = fresh_store().await;
        fresh.load_from_path(&path).await.unwrap();

        let restored_chunks = fresh.get_all_chunks(id).unwrap();
        let mut restored_ids: Vec<Uuid> = restored_chunks.iter().map(|c| c.id).collect();
        restored_ids.sort();
        let mut expected_ids = vec![a.id, b.id];
        expected_ids.sort();
        assert_eq!(restored_ids, expected_ids);
    }

    #[tokio::test]
    async fn snapshot_round_trip_restores_empty_but_built_library() {
        // A library created and snapshotted with zero chunks still has an
        // index built over empty data (`create_library` calls
        // `build_index` unconditionally). Restoring it must preserve that
        // built-but-empty state: `search` should return `[]`, not fail
        // with `NotBuilt`.
        let store = fresh_store().await;
        let id = store.create_library("empty", Metadata::new(), None).unwrap();

        let dir = tempfile_dir();
        let path = dir.join("snap.bin");
        tokio::fs::write(&path, snapshot_payload(&store)).await.unwrap();

        let fresh = fresh_store().await;
        fresh.load_from_path(&path).await.unwrap();

        let results = fresh.search(id, &[0.0, 0.0, 0.0, 0.0], 5, None).unwrap();
        assert!(results.is_empty());
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("abkve-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn concurrent_upserts_against_same_library_all_land() {
        let store = fresh_store().await;
        let id = store.create_library("lib", Metadata::new(), None).unwrap();

        let mut handles = Vec::new();
        for i in 0..5 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let chunk = Chunk::new(format!("c{i}"), vec![0.0; 4], Metadata::new());
                store.upsert_chunks(id, vec![chunk], None).unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.count_chunks(id).unwrap(), 5);
    }
}
