//! Memory store orchestrator
//!
//! The single mutation gateway. Composes the chunk repository (authoritative
//! state), the semantic index (derived state), the audit log (observability)
//! and the directory watcher (reconciliation), and serializes every mutating
//! operation behind one mutex, which is held across embedder inference.
//! Within an operation the order is always storage, then index, then audit,
//! so a caller that saw an operation return is guaranteed to see its effects
//! in the next query.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use tracing::{info, warn};

use crate::audit::{AuditAction, AuditDetail, AuditLog};
use crate::chunk::storage::{chunk_id_from_filename, ChunkStorage};
use crate::chunk::{Chunk, ChunkMeta, ChunkPatch};
use crate::config::StoreConfig;
use crate::constants::{AUDIT_EXCERPT_LEN, DEFAULT_QUERY_LIMIT};
use crate::embeddings::bge::{BgeEmbedder, EmbeddingConfig};
use crate::embeddings::Embedder;
use crate::errors::{MemoryError, Result};
use crate::index::SemanticIndex;
use crate::watcher::{ChunkEvent, ChunkWatcher};

/// Store-level counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Chunks on disk
    pub chunk_count: usize,
    /// Documents in the semantic index
    pub indexed_count: usize,
    /// The directory this store owns
    pub data_dir: PathBuf,
}

/// The components every operation runs against, locked as one unit
struct Core {
    storage: ChunkStorage,
    index: SemanticIndex,
    audit: AuditLog,
}

impl Core {
    /// Bring the index back in sync after an external file event
    ///
    /// Idempotent: re-embedding the same `(id, text)` produces the same
    /// vector, and removing an absent document is a no-op.
    fn reconcile(&mut self, event: &ChunkEvent) -> Result<()> {
        let Some(id) = event
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(chunk_id_from_filename)
        else {
            return Ok(());
        };

        match event {
            ChunkEvent::Added(_) | ChunkEvent::Changed(_) => {
                self.storage.reload_index()?;
                if let Some(chunk) = self.storage.read(&id)? {
                    self.index.update_document(&id, &chunk.embedding_text())?;
                    self.audit.log(
                        AuditAction::Reload,
                        Some(&id),
                        Some("external file change".into()),
                    );
                }
            }
            ChunkEvent::Removed(_) => {
                self.storage.reload_index()?;
                self.index.remove_document(&id);
                info!(%id, "chunk removed externally");
            }
        }
        Ok(())
    }
}

/// Long-lived semantic memory store over one data directory
pub struct MemoryStore {
    data_dir: PathBuf,
    core: Arc<Mutex<Core>>,
    watcher: Mutex<Option<ChunkWatcher>>,
    initialized: AtomicBool,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

impl MemoryStore {
    /// Open a store with the configured embedding model (falls back to hash
    /// embeddings when model files are absent)
    pub fn open(config: &StoreConfig) -> Result<Arc<Self>> {
        let model_dir = config.index.resolved_model_dir();
        let embedder = BgeEmbedder::new(EmbeddingConfig::for_model_dir(&model_dir));
        Self::open_with_embedder(config, Arc::new(embedder))
    }

    /// Open a store with an explicit embedder (tests use the hash embedder)
    pub fn open_with_embedder(
        config: &StoreConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Arc<Self>> {
        config.log();

        let mut storage = ChunkStorage::new(&config.data_dir);
        storage.initialize()?;

        let audit = AuditLog::new(&config.data_dir);
        audit.initialize()?;

        let mut index = SemanticIndex::new(embedder, config.index.to_hnsw());

        // Rebuild derived state from the authoritative file set
        let chunks = storage.read_all()?;
        let loaded = chunks.len();
        for chunk in &chunks {
            index.add_document(&chunk.id, &chunk.embedding_text())?;
        }
        info!(loaded, data_dir = ?config.data_dir, "memory store initialized");

        let core = Arc::new(Mutex::new(Core {
            storage,
            index,
            audit,
        }));

        let watcher_core = Arc::clone(&core);
        let chunks_dir = core.lock().storage.chunks_dir().to_path_buf();
        let watcher = ChunkWatcher::spawn(chunks_dir, move |event| {
            let mut core = watcher_core.lock();
            if let Err(e) = core.reconcile(&event) {
                // Swallowed on purpose: the next event re-reconciles
                warn!(%e, path = %event.path().display(), "watcher reconciliation failed");
            }
        })?;

        core.lock().audit.log(
            AuditAction::Init,
            None,
            Some(format!("loaded {loaded} chunks").into()),
        );

        Ok(Arc::new(Self {
            data_dir: config.data_dir.clone(),
            core,
            watcher: Mutex::new(Some(watcher)),
            initialized: AtomicBool::new(true),
        }))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Store a new chunk, returning its generated ID
    ///
    /// `metadata` must carry `summary`, `type`, `epistemic` and
    /// `surface_tags`; everything else defaults.
    pub fn store_chunk(&self, content: &str, metadata: ChunkPatch) -> Result<String> {
        let mut core = self.core.lock();

        // Validate the metadata before consuming an ID
        let mut chunk = metadata.into_new_chunk(String::new(), content.to_string(), Utc::now())?;
        let id = core.storage.generate_unique_id()?;
        chunk.id = id.clone();

        core.storage.write(&chunk)?;
        core.index.add_document(&chunk.id, &chunk.embedding_text())?;
        core.audit.log(
            AuditAction::Store,
            Some(&chunk.id),
            Some(
                json!({
                    "type": chunk.chunk_type,
                    "epistemic": chunk.epistemic,
                    "tags": chunk.surface_tags,
                })
                .into(),
            ),
        );

        info!(id = %chunk.id, summary = %chunk.summary, "chunk stored");
        Ok(id)
    }

    /// Merge metadata and/or replace the body of an existing chunk
    pub fn update_chunk(
        &self,
        id: &str,
        metadata: Option<ChunkPatch>,
        content: Option<String>,
    ) -> Result<Chunk> {
        let mut core = self.core.lock();

        let mut chunk = core
            .storage
            .read(id)?
            .ok_or_else(|| MemoryError::ChunkNotFound(id.to_string()))?;

        if let Some(patch) = &metadata {
            patch.apply_to(&mut chunk);
        }
        chunk.id = id.to_string();
        chunk.updated = Utc::now();

        let content_changed = content.is_some();
        if let Some(content) = content {
            chunk.content = content;
        }

        core.storage.write(&chunk)?;
        core.index.update_document(&chunk.id, &chunk.embedding_text())?;

        let mut detail = serde_json::Map::new();
        if let Some(patch) = &metadata {
            detail.insert(
                "changed".into(),
                serde_json::to_value(patch).unwrap_or_default(),
            );
        }
        if content_changed {
            detail.insert("content".into(), excerpt(&chunk.content).into());
        }
        core.audit.log(
            AuditAction::Update,
            Some(id),
            Some(serde_json::Value::Object(detail).into()),
        );

        info!(id, "chunk updated");
        Ok(chunk)
    }

    /// Read chunks by ID, preserving input order, dropping unknown IDs
    pub fn get_chunks(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        self.core.lock().storage.read_many(ids)
    }

    /// Semantic query with retrieval write-back
    ///
    /// Every hit gets `retrieved_count` incremented and `accessed` advanced
    /// before the result is returned. Results carry no content.
    pub fn query(&self, search_text: &str, limit: Option<usize>) -> Result<Vec<ChunkMeta>> {
        let limit = limit.unwrap_or(DEFAULT_QUERY_LIMIT);
        let mut core = self.core.lock();

        let hits = core.index.query(search_text, limit)?;
        if hits.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();

        let now = Utc::now();
        let mut metas = Vec::with_capacity(hits.len());
        for hit in &hits {
            let Some(mut chunk) = core.storage.read(&hit.id)? else {
                // Index ahead of storage; the watcher will catch it up
                continue;
            };
            chunk.retrieved_count += 1;
            chunk.accessed = now;
            core.storage.write(&chunk)?;
            metas.push(chunk.meta(Some(hit.distance)));
        }

        core.audit.log(
            AuditAction::Query,
            None,
            Some(json!({ "query": search_text, "ids": ids }).into()),
        );
        core.audit.log(
            AuditAction::Retrieve,
            None,
            Some(AuditDetail::Text(ids.join(","))),
        );

        Ok(metas)
    }

    /// Record that the given chunks proved relevant; unknown IDs are skipped
    ///
    /// Returns how many chunks were updated.
    pub fn mark_relevant(&self, ids: &[String]) -> Result<usize> {
        let mut core = self.core.lock();

        let now = Utc::now();
        let mut updated = Vec::new();
        for id in ids {
            let Some(mut chunk) = core.storage.read(id)? else {
                continue;
            };
            chunk.relevant_count += 1;
            chunk.last_relevant_date = Some(now);
            core.storage.write(&chunk)?;
            updated.push(id.clone());
        }

        core.audit.log(
            AuditAction::Relevant,
            None,
            Some(AuditDetail::Text(updated.join(","))),
        );
        Ok(updated.len())
    }

    /// Archive a chunk, recording why
    pub fn mark_obsolete(&self, id: &str, reason: &str) -> Result<()> {
        let mut core = self.core.lock();

        let mut chunk = core
            .storage
            .read(id)?
            .ok_or_else(|| MemoryError::ChunkNotFound(id.to_string()))?;

        chunk.status = crate::chunk::LifecycleStatus::Archived;
        chunk.updated = Utc::now();
        let note = format!("[Obsoleted: {reason}]");
        chunk.context_notes = Some(match chunk.context_notes.take() {
            Some(notes) if !notes.is_empty() => format!("{notes}\n{note}"),
            _ => note,
        });

        core.storage.write(&chunk)?;
        core.audit
            .log(AuditAction::Obsolete, Some(id), Some(reason.into()));

        info!(id, reason, "chunk archived");
        Ok(())
    }

    /// Raw audit log text, optionally from a point in time onward
    pub fn get_audit_log(&self, since: Option<DateTime<Utc>>) -> Result<String> {
        self.core.lock().audit.read_since(since)
    }

    pub fn stats(&self) -> StoreStats {
        let core = self.core.lock();
        StoreStats {
            chunk_count: core.storage.count(),
            indexed_count: core.index.document_count(),
            data_dir: self.data_dir.clone(),
        }
    }

    /// Stop the watcher and mark the store uninitialized
    pub fn shutdown(&self) {
        if let Some(mut watcher) = self.watcher.lock().take() {
            watcher.stop();
        }
        self.initialized.store(false, Ordering::Release);
        info!(data_dir = ?self.data_dir, "memory store shut down");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

/// Truncate content for the audit trail
fn excerpt(content: &str) -> String {
    if content.chars().count() > AUDIT_EXCERPT_LEN {
        let cut: String = content.chars().take(AUDIT_EXCERPT_LEN).collect();
        format!("{cut}...")
    } else {
        content.to_string()
    }
}

// =============================================================================
// Process-wide store
// =============================================================================

static GLOBAL: Mutex<Option<Arc<MemoryStore>>> = Mutex::new(None);

/// Get the process-wide store, initializing it on first access
///
/// Subsequent calls with the same directory return the existing instance;
/// re-initializing with a different directory is rejected.
pub fn memory_store(data_dir: impl Into<PathBuf>) -> Result<Arc<MemoryStore>> {
    // Resolve the environment override first so repeat calls compare
    // against the directory actually in use
    let config = StoreConfig::from_env(data_dir);
    let mut guard = GLOBAL.lock();

    if let Some(existing) = guard.as_ref() {
        if existing.data_dir == config.data_dir {
            return Ok(Arc::clone(existing));
        }
        return Err(MemoryError::AlreadyInitialized {
            current: existing.data_dir.clone(),
        });
    }

    let store = MemoryStore::open(&config)?;
    *guard = Some(Arc::clone(&store));
    Ok(store)
}

/// Tear down the process-wide store, if any
pub fn shutdown_memory_store() {
    if let Some(store) = GLOBAL.lock().take() {
        store.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkType, EpistemicStatus};
    use crate::embeddings::hash::HashEmbedder;
    use tempfile::TempDir;

    fn test_store() -> (Arc<MemoryStore>, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let config = StoreConfig::new(dir.path());
        let store =
            MemoryStore::open_with_embedder(&config, Arc::new(HashEmbedder::default()))
                .expect("open store");
        (store, dir)
    }

    fn fact(summary: &str) -> ChunkPatch {
        ChunkPatch {
            summary: Some(summary.into()),
            chunk_type: Some(ChunkType::Fact),
            epistemic: Some(EpistemicStatus::Established),
            surface_tags: Some(vec!["test".into()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_store_requires_metadata() {
        let (store, _dir) = test_store();
        let err = store
            .store_chunk("body", ChunkPatch::default())
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_REQUIRED_FIELD");
    }

    #[test]
    fn test_update_unknown_chunk() {
        let (store, _dir) = test_store();
        let err = store.update_chunk("ffffff", None, None).unwrap_err();
        assert_eq!(err.code(), "CHUNK_NOT_FOUND");
    }

    #[test]
    fn test_obsolete_unknown_chunk() {
        let (store, _dir) = test_store();
        let err = store.mark_obsolete("ffffff", "gone").unwrap_err();
        assert_eq!(err.code(), "CHUNK_NOT_FOUND");
    }

    #[test]
    fn test_stats_track_storage_and_index() {
        let (store, _dir) = test_store();
        assert_eq!(store.stats().chunk_count, 0);
        assert_eq!(store.stats().indexed_count, 0);

        store.store_chunk("body", fact("one")).unwrap();
        store.store_chunk("body", fact("two")).unwrap();

        let stats = store.stats();
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.indexed_count, 2);
    }

    #[test]
    fn test_mark_relevant_skips_unknown() {
        let (store, _dir) = test_store();
        let id = store.store_chunk("body", fact("known")).unwrap();
        let updated = store
            .mark_relevant(&[id.clone(), "ffffff".to_string()])
            .unwrap();
        assert_eq!(updated, 1);

        let chunk = &store.get_chunks(&[id]).unwrap()[0];
        assert_eq!(chunk.relevant_count, 1);
        assert!(chunk.last_relevant_date.is_some());
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "x".repeat(150);
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), AUDIT_EXCERPT_LEN + 3);
        assert!(cut.ends_with("..."));
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn test_shutdown_stops_watcher() {
        let (store, _dir) = test_store();
        assert!(store.is_initialized());
        store.shutdown();
        assert!(!store.is_initialized());
        // Idempotent
        store.shutdown();
    }
}
