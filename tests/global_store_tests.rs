//! Process-wide store lifecycle tests
//!
//! The global store is per-process state, so these assertions live in their
//! own integration binary where nothing else touches it.

use tempfile::TempDir;

use kura_memory::store::{memory_store, shutdown_memory_store};

#[test]
fn test_global_store_lifecycle() {
    let dir = TempDir::new().unwrap();

    let first = memory_store(dir.path()).expect("first init");
    let second = memory_store(dir.path()).expect("same dir re-entry");
    assert!(std::sync::Arc::ptr_eq(&first, &second));

    // A different directory is rejected for the life of the process
    let other = TempDir::new().unwrap();
    let err = memory_store(other.path()).unwrap_err();
    assert_eq!(err.code(), "ALREADY_INITIALIZED");

    assert!(first.is_initialized());
    shutdown_memory_store();
    assert!(!first.is_initialized());
}
