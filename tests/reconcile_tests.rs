//! External-edit reconciliation tests
//!
//! The chunk directory is shared with the user's editor: files rewritten or
//! deleted outside the store must flow back into the semantic index through
//! the watcher. These tests drive real filesystem edits and poll with
//! generous deadlines to ride out the write-settle window.
//!
//! Run with: cargo test --test reconcile_tests

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use kura_memory::chunk::codec;
use kura_memory::chunk::{ChunkPatch, ChunkType, EpistemicStatus};
use kura_memory::config::StoreConfig;
use kura_memory::embeddings::hash::HashEmbedder;
use kura_memory::store::MemoryStore;

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Settle window is 500ms; leave plenty of slack for slow CI machines
const DEADLINE: Duration = Duration::from_secs(10);

fn create_test_store() -> (Arc<MemoryStore>, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = StoreConfig::new(dir.path());
    let store = MemoryStore::open_with_embedder(&config, Arc::new(HashEmbedder::default()))
        .expect("Failed to open store");
    (store, dir)
}

fn metadata(summary: &str) -> ChunkPatch {
    ChunkPatch {
        summary: Some(summary.to_string()),
        chunk_type: Some(ChunkType::Fact),
        epistemic: Some(EpistemicStatus::Established),
        surface_tags: Some(vec!["reconcile".into()]),
        ..Default::default()
    }
}

fn chunk_path(dir: &TempDir, id: &str) -> PathBuf {
    let chunks = dir.path().join("chunks");
    std::fs::read_dir(&chunks)
        .expect("chunks dir")
        .flatten()
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(id))
                .unwrap_or(false)
        })
        .unwrap_or_else(|| panic!("no file for chunk {id}"))
}

fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = Instant::now() + DEADLINE;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    cond()
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[test]
fn test_external_edit_reconciles() {
    let (store, dir) = create_test_store();

    let id = store
        .store_chunk(
            "original body about gardening",
            metadata("a note to be edited externally"),
        )
        .expect("store");

    // Rewrite the file outside the store with a completely different body
    let path = chunk_path(&dir, &id);
    let text = std::fs::read_to_string(&path).unwrap();
    let mut chunk = codec::parse(&text, "external").unwrap();
    chunk.content = "quantum error correction stabilizer codes".into();
    std::fs::write(&path, codec::serialize(&chunk)).unwrap();

    // The new body becomes searchable once the watcher settles; the old
    // gardening embedding shares nothing with this query, so a small
    // distance proves the vector was actually refreshed
    let found = wait_for(|| {
        store
            .query("quantum error correction stabilizer codes", Some(1))
            .map(|r| {
                r.first()
                    .map(|m| m.id == id && m.distance.unwrap_or(1.0) < 0.9)
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    });
    assert!(found, "externally written body never became searchable");

    let indexed_before = store.stats().indexed_count;

    // Deleting the file drops the chunk from the index
    std::fs::remove_file(&path).unwrap();
    let dropped = wait_for(|| store.stats().indexed_count == indexed_before - 1);
    assert!(dropped, "deleted chunk never left the index");

    let results = store.query("quantum error correction", Some(5)).unwrap();
    assert!(results.iter().all(|m| m.id != id));
}

#[test]
fn test_external_new_file_gets_indexed() {
    let (store, dir) = create_test_store();

    // A chunk dropped into the directory by hand, never seen by the store
    let text = "---\n\
                id: face01\n\
                summary: handwritten chunk\n\
                type: insight\n\
                epistemic: working\n\
                created: 2025-06-01T00:00:00Z\n\
                updated: 2025-06-01T00:00:00Z\n\
                accessed: 2025-06-01T00:00:00Z\n\
                ---\n\n\
                zebra migration patterns in the serengeti\n";
    std::fs::write(dir.path().join("chunks/face01-handwritten.md"), text).unwrap();

    let found = wait_for(|| {
        store
            .query("zebra migration patterns", Some(1))
            .map(|r| r.first().map(|m| m.id == "face01").unwrap_or(false))
            .unwrap_or(false)
    });
    assert!(found, "handwritten chunk never became searchable");
    assert_eq!(store.stats().chunk_count, 1);
}

#[test]
fn test_reconciliation_is_idempotent() {
    let (store, dir) = create_test_store();

    let id = store
        .store_chunk("stable content", metadata("idempotence probe"))
        .expect("store");
    let path = chunk_path(&dir, &id);

    // Rewrite the identical bytes twice; the index must not drift
    let text = std::fs::read_to_string(&path).unwrap();
    for _ in 0..2 {
        std::fs::write(&path, &text).unwrap();
        std::thread::sleep(Duration::from_millis(900));
    }

    assert_eq!(store.stats().chunk_count, 1);
    assert_eq!(store.stats().indexed_count, 1);
    let results = store.query("stable content", Some(1)).unwrap();
    assert_eq!(results[0].id, id);
}

#[test]
fn test_non_chunk_files_ignored() {
    let (store, dir) = create_test_store();
    store
        .store_chunk("real chunk", metadata("real"))
        .expect("store");

    std::fs::write(dir.path().join("chunks/notes.md"), "scratch pad").unwrap();
    std::fs::write(dir.path().join("chunks/.a1b2c3-hidden.md"), "dotfile").unwrap();
    std::thread::sleep(Duration::from_millis(900));

    assert_eq!(store.stats().indexed_count, 1);
}

#[test]
fn test_self_writes_do_not_drift_the_index() {
    let (store, _dir) = create_test_store();

    let id = store
        .store_chunk("body one", metadata("first"))
        .expect("store");
    store
        .update_chunk(&id, None, Some("body two".into()))
        .expect("update");

    // Give the watcher time to refire on the store's own writes
    std::thread::sleep(Duration::from_millis(900));

    assert_eq!(store.stats().chunk_count, 1);
    assert_eq!(store.stats().indexed_count, 1);
    let results = store.query("body two", Some(1)).unwrap();
    assert_eq!(results[0].id, id);
}
