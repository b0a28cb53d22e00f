//! Chunk data model
//!
//! A chunk is the atomic, independently retrievable memory record: a free-form
//! text body plus the metadata that drives retrieval and lifecycle management.

pub mod codec;
pub mod storage;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::CHUNK_ID_LEN;
use crate::errors::{MemoryError, Result};

/// What kind of knowledge a chunk carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Framework,
    Insight,
    Fact,
    Log,
    Emotional,
    Goal,
    Question,
}

/// How settled the knowledge is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpistemicStatus {
    Established,
    Working,
    Speculative,
    Deprecated,
}

/// Lifecycle state of a chunk
///
/// `Archived` is terminal in normal operation; archived chunks stay readable
/// and indexed until an operator removes the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    #[default]
    Active,
    Dormant,
    Review,
    Archived,
}

/// A typed link to another chunk
///
/// The target `id` need not resolve; dangling references are allowed and are
/// resolved by lookup when a caller cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedRef {
    pub id: String,
    pub reason: String,
}

/// The atomic memory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// 6 lowercase hex characters, unique in the store, immutable
    pub id: String,

    /// Free-form text body
    pub content: String,

    /// 1-2 sentence scan line
    pub summary: String,

    #[serde(rename = "type")]
    pub chunk_type: ChunkType,

    pub epistemic: EpistemicStatus,

    pub status: LifecycleStatus,

    /// Short free-form labels answering "surface this chunk when discussing ___"
    pub surface_tags: Vec<String>,

    pub related: Vec<RelatedRef>,

    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub accessed: DateTime<Utc>,

    /// Incremented on each query hit
    pub retrieved_count: u64,

    /// Incremented by explicit mark-relevant
    pub relevant_count: u64,

    pub last_relevant_date: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_notes: Option<String>,
}

impl Chunk {
    /// The deterministic embedding input for this chunk
    ///
    /// The same formula is used everywhere a vector is computed (store,
    /// update, external reload), so re-embedding is idempotent.
    pub fn embedding_text(&self) -> String {
        format!(
            "{}\n\n{}\n\n{}",
            self.summary,
            self.surface_tags.join(", "),
            self.content
        )
    }

    /// Whether the chunk's optional expiry lies in the past
    ///
    /// Expiry never deletes anything; surfacing policy belongs to callers.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.map(|e| e <= now).unwrap_or(false)
    }

    /// Metadata view of this chunk (content stripped), with a query distance
    pub fn meta(&self, distance: Option<f32>) -> ChunkMeta {
        ChunkMeta {
            id: self.id.clone(),
            summary: self.summary.clone(),
            chunk_type: self.chunk_type,
            epistemic: self.epistemic,
            status: self.status,
            surface_tags: self.surface_tags.clone(),
            related: self.related.clone(),
            created: self.created,
            updated: self.updated,
            accessed: self.accessed,
            retrieved_count: self.retrieved_count,
            relevant_count: self.relevant_count,
            last_relevant_date: self.last_relevant_date,
            expires: self.expires,
            context_notes: self.context_notes.clone(),
            distance,
        }
    }
}

/// A chunk without its body, as returned by semantic queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub id: String,
    pub summary: String,
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,
    pub epistemic: EpistemicStatus,
    pub status: LifecycleStatus,
    pub surface_tags: Vec<String>,
    pub related: Vec<RelatedRef>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub retrieved_count: u64,
    pub relevant_count: u64,
    pub last_relevant_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_notes: Option<String>,
    /// Cosine distance of the query hit that produced this view
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

/// Partial chunk metadata, used both as the `metadata` argument of store
/// (where the required fields are validated) and as the merge overlay of
/// update (where every field is optional).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub chunk_type: Option<ChunkType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epistemic: Option<EpistemicStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LifecycleStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related: Option<Vec<RelatedRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_notes: Option<String>,
}

impl ChunkPatch {
    /// Build a fresh chunk from this patch, validating required fields
    ///
    /// Defaults: `status = active`, empty `related`, all timestamps `now`,
    /// counters zero, `last_relevant_date` null.
    pub fn into_new_chunk(
        self,
        id: String,
        content: String,
        now: DateTime<Utc>,
    ) -> Result<Chunk> {
        let summary = self
            .summary
            .ok_or_else(|| MemoryError::MissingRequiredField("summary".into()))?;
        let chunk_type = self
            .chunk_type
            .ok_or_else(|| MemoryError::MissingRequiredField("type".into()))?;
        let epistemic = self
            .epistemic
            .ok_or_else(|| MemoryError::MissingRequiredField("epistemic".into()))?;
        let surface_tags = self
            .surface_tags
            .ok_or_else(|| MemoryError::MissingRequiredField("surface_tags".into()))?;

        Ok(Chunk {
            id,
            content,
            summary,
            chunk_type,
            epistemic,
            status: self.status.unwrap_or_default(),
            surface_tags,
            related: self.related.unwrap_or_default(),
            created: now,
            updated: now,
            accessed: now,
            retrieved_count: 0,
            relevant_count: 0,
            last_relevant_date: None,
            expires: self.expires,
            context_notes: self.context_notes,
        })
    }

    /// Merge this patch over an existing chunk, leaving unset fields alone
    ///
    /// The chunk's `id` and timestamps are never touched here; the caller
    /// owns `updated`.
    pub fn apply_to(&self, chunk: &mut Chunk) {
        if let Some(summary) = &self.summary {
            chunk.summary = summary.clone();
        }
        if let Some(chunk_type) = self.chunk_type {
            chunk.chunk_type = chunk_type;
        }
        if let Some(epistemic) = self.epistemic {
            chunk.epistemic = epistemic;
        }
        if let Some(status) = self.status {
            chunk.status = status;
        }
        if let Some(tags) = &self.surface_tags {
            chunk.surface_tags = tags.clone();
        }
        if let Some(related) = &self.related {
            chunk.related = related.clone();
        }
        if let Some(expires) = self.expires {
            chunk.expires = Some(expires);
        }
        if let Some(notes) = &self.context_notes {
            chunk.context_notes = Some(notes.clone());
        }
    }
}

/// Whether a string is a well-formed chunk ID (6 lowercase hex characters)
pub fn is_chunk_id(s: &str) -> bool {
    s.len() == CHUNK_ID_LEN && s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}
