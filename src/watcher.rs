//! Chunk directory watcher
//!
//! Watches the top level of the chunk directory and reports settled
//! add/change/remove events. The notify backend supplies wake-ups; the
//! watcher thread itself stats pending paths and only emits once a file's
//! size has held still for the settle window, so half-written editor saves
//! never reach the orchestrator. Removals emit immediately.
//!
//! Events caused by the store's own writes are not suppressed; the
//! orchestrator's reconciliation is idempotent, so a self-triggered reload
//! is just a wasted re-embed.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::constants::{WATCH_POLL_MS, WRITE_SETTLE_MS};
use crate::errors::{MemoryError, Result};

/// A settled filesystem event on the chunk directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkEvent {
    Added(PathBuf),
    Changed(PathBuf),
    Removed(PathBuf),
}

impl ChunkEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::Added(p) | Self::Changed(p) | Self::Removed(p) => p,
        }
    }
}

/// A file waiting out its settle window
struct Pending {
    size: u64,
    stable_since: Instant,
}

/// Background watcher over the chunk directory
pub struct ChunkWatcher {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ChunkWatcher {
    /// Start watching `dir`, invoking `on_event` for every settled event
    ///
    /// The callback runs on the watcher thread; it must not block for long.
    pub fn spawn<F>(dir: PathBuf, on_event: F) -> Result<Self>
    where
        F: FnMut(ChunkEvent) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| MemoryError::Io(std::io::Error::other(e)))?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| MemoryError::Io(std::io::Error::other(e)))?;

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let handle = std::thread::Builder::new()
            .name("chunk-watcher".into())
            .spawn(move || {
                // The notify watcher must stay alive for the thread's lifetime
                let _watcher = watcher;
                run_loop(&dir, rx, thread_running, on_event);
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the watcher thread and wait for it to exit
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ChunkWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Whether the watcher should care about this path at all
fn eligible(dir: &Path, path: &Path) -> bool {
    if path == dir {
        return false;
    }
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => !name.starts_with('.'),
        None => false,
    }
}

fn run_loop<F>(
    dir: &Path,
    rx: mpsc::Receiver<notify::Result<notify::Event>>,
    running: Arc<AtomicBool>,
    mut on_event: F,
) where
    F: FnMut(ChunkEvent),
{
    let settle = Duration::from_millis(WRITE_SETTLE_MS);
    let poll = Duration::from_millis(WATCH_POLL_MS);

    // Paths that have completed a settle cycle; distinguishes add from change
    let mut seen: HashSet<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file() && eligible(dir, p))
                .collect()
        })
        .unwrap_or_default();

    let mut pending: HashMap<PathBuf, Pending> = HashMap::new();

    while running.load(Ordering::Acquire) {
        match rx.recv_timeout(poll) {
            Ok(Ok(event)) => {
                for path in event.paths {
                    if !eligible(dir, &path) {
                        continue;
                    }
                    match std::fs::metadata(&path) {
                        Ok(meta) if meta.is_file() => {
                            let entry = pending.entry(path).or_insert(Pending {
                                size: meta.len(),
                                stable_since: Instant::now(),
                            });
                            if entry.size != meta.len() {
                                entry.size = meta.len();
                                entry.stable_since = Instant::now();
                            }
                        }
                        Ok(_) => {}
                        Err(_) => {
                            // Gone already: a removal (or a rename away)
                            pending.remove(&path);
                            if seen.remove(&path) {
                                debug!(path = %path.display(), "chunk file removed");
                                on_event(ChunkEvent::Removed(path));
                            }
                        }
                    }
                }
            }
            Ok(Err(e)) => warn!(%e, "watch backend error"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        // Settle pass: emit paths whose size held still long enough
        let mut ready: Vec<PathBuf> = Vec::new();
        let mut gone: Vec<PathBuf> = Vec::new();
        for (path, entry) in pending.iter_mut() {
            match std::fs::metadata(path) {
                Ok(meta) => {
                    if meta.len() != entry.size {
                        entry.size = meta.len();
                        entry.stable_since = Instant::now();
                    } else if entry.stable_since.elapsed() >= settle {
                        ready.push(path.clone());
                    }
                }
                Err(_) => gone.push(path.clone()),
            }
        }
        for path in gone {
            pending.remove(&path);
            if seen.remove(&path) {
                debug!(path = %path.display(), "chunk file removed");
                on_event(ChunkEvent::Removed(path));
            }
        }
        for path in ready {
            pending.remove(&path);
            if seen.insert(path.clone()) {
                debug!(path = %path.display(), "chunk file added");
                on_event(ChunkEvent::Added(path));
            } else {
                debug!(path = %path.display(), "chunk file changed");
                on_event(ChunkEvent::Changed(path));
            }
        }
    }
}
