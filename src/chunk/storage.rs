//! Chunk repository
//!
//! Owns the `chunks/` directory: one file per live chunk, named
//! `{id}-{slug}.md`. The directory is the authoritative state; everything
//! else in the store is derived from it. Files are written whole and never
//! locked, so the user can edit them with any editor.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{codec, is_chunk_id, Chunk};
use crate::constants::{
    CHUNKS_DIR, CHUNK_EXTENSION, ID_GENERATION_MAX_ATTEMPTS, SLUG_MAX_LEN,
};
use crate::errors::{MemoryError, Result};

/// Filesystem-backed chunk store with an in-memory `id -> filename` map
pub struct ChunkStorage {
    chunks_dir: PathBuf,
    filenames: HashMap<String, String>,
}

impl ChunkStorage {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            chunks_dir: data_dir.join(CHUNKS_DIR),
            filenames: HashMap::new(),
        }
    }

    /// Create the directory if missing and build the filename map. Idempotent.
    pub fn initialize(&mut self) -> Result<()> {
        fs::create_dir_all(&self.chunks_dir)?;
        self.reload_index()
    }

    /// Rescan the chunk directory, rebuilding the `id -> filename` map
    ///
    /// Files whose name does not start with a 6-hex ID prefix are ignored;
    /// the user is free to keep notes of their own in the directory.
    pub fn reload_index(&mut self) -> Result<()> {
        self.filenames.clear();
        for entry in fs::read_dir(&self.chunks_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = chunk_id_from_filename(name) {
                self.filenames.insert(id, name.to_string());
            }
        }
        debug!(count = self.filenames.len(), "chunk index reloaded");
        Ok(())
    }

    pub fn chunks_dir(&self) -> &Path {
        &self.chunks_dir
    }

    pub fn exists(&self, id: &str) -> bool {
        self.filenames.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.filenames.len()
    }

    pub fn get_all_ids(&self) -> Vec<String> {
        self.filenames.keys().cloned().collect()
    }

    /// Draw a fresh 6-hex ID not present in the store
    pub fn generate_unique_id(&self) -> Result<String> {
        for _ in 0..ID_GENERATION_MAX_ATTEMPTS {
            let bytes: [u8; 3] = rand::random();
            let id = format!("{:02x}{:02x}{:02x}", bytes[0], bytes[1], bytes[2]);
            if !self.exists(&id) {
                return Ok(id);
            }
        }
        Err(MemoryError::IdExhausted {
            attempts: ID_GENERATION_MAX_ATTEMPTS,
        })
    }

    /// Read one chunk; `None` when the ID is unknown
    pub fn read(&self, id: &str) -> Result<Option<Chunk>> {
        let Some(filename) = self.filenames.get(id) else {
            return Ok(None);
        };
        let text = fs::read_to_string(self.chunks_dir.join(filename))?;
        codec::parse(&text, filename).map(Some)
    }

    /// Read several chunks, preserving input order and silently dropping
    /// unknown IDs
    pub fn read_many(&self, ids: &[String]) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(chunk) = self.read(id)? {
                chunks.push(chunk);
            }
        }
        Ok(chunks)
    }

    /// Read every chunk in the store, skipping files that fail to parse
    ///
    /// Used by the index rebuild at startup: a single corrupt file must not
    /// take the whole store down.
    pub fn read_all(&self) -> Result<Vec<Chunk>> {
        let mut chunks = Vec::with_capacity(self.filenames.len());
        for (id, filename) in &self.filenames {
            let text = fs::read_to_string(self.chunks_dir.join(filename))?;
            match codec::parse(&text, filename) {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => warn!(%id, %e, "skipping unparsable chunk file"),
            }
        }
        Ok(chunks)
    }

    /// Write a chunk, renaming its file when the summary slug changed
    ///
    /// Whole-file overwrite; last writer wins.
    pub fn write(&mut self, chunk: &Chunk) -> Result<()> {
        let target = format!(
            "{}-{}.{}",
            chunk.id,
            slugify(&chunk.summary),
            CHUNK_EXTENSION
        );

        if let Some(previous) = self.filenames.get(&chunk.id) {
            if previous != &target {
                match fs::remove_file(self.chunks_dir.join(previous)) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        fs::write(self.chunks_dir.join(&target), codec::serialize(chunk))?;
        self.filenames.insert(chunk.id.clone(), target);
        Ok(())
    }

    /// Unlink a chunk's file; `false` when the ID is unknown
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let Some(filename) = self.filenames.remove(id) else {
            return Ok(false);
        };
        match fs::remove_file(self.chunks_dir.join(&filename)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e.into()),
        }
    }
}

/// Extract the chunk ID from a `{id}-{slug}.md` filename
///
/// Returns `None` unless the name carries the chunk extension and the part
/// before the first `-` is 6 lowercase hex characters.
pub fn chunk_id_from_filename(name: &str) -> Option<String> {
    let stem = name.strip_suffix(&format!(".{CHUNK_EXTENSION}"))?;
    let prefix = stem.split('-').next()?;
    is_chunk_id(prefix).then(|| prefix.to_string())
}

/// Derive a filename slug from a chunk summary
///
/// Lowercase, runs of non-alphanumerics collapse to `-`, leading/trailing
/// `-` trimmed, at most 15 characters with any dash the cut exposed removed.
pub fn slugify(summary: &str) -> String {
    let lowered = summary.to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut pending_separator = false;
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c);
        } else {
            pending_separator = true;
        }
    }
    slug.truncate(SLUG_MAX_LEN);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
