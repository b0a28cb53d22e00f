//! Chunk file codec
//!
//! A chunk file is a YAML front matter block holding every field except the
//! body, followed by a blank line and the body:
//!
//! ```text
//! ---
//! id: a1b2c3
//! summary: ...
//! ---
//!
//! <content>
//! ```
//!
//! Serialization goes through serde so the round-trip law
//! `parse(serialize(c)) == c` holds structurally (modulo header field order).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Chunk, ChunkType, EpistemicStatus, LifecycleStatus, RelatedRef};
use crate::errors::{MemoryError, Result};

/// Front matter schema: every chunk field except the body
///
/// Unknown keys in existing files are ignored on parse; counters and the
/// relevance timestamp default when absent so hand-written files stay valid.
#[derive(Debug, Serialize, Deserialize)]
struct FrontMatter {
    id: String,
    summary: String,
    #[serde(rename = "type")]
    chunk_type: ChunkType,
    epistemic: EpistemicStatus,
    #[serde(default)]
    status: LifecycleStatus,
    #[serde(default)]
    surface_tags: Vec<String>,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
    accessed: DateTime<Utc>,
    #[serde(default)]
    retrieved_count: u64,
    #[serde(default)]
    relevant_count: u64,
    #[serde(default)]
    last_relevant_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    related: Vec<RelatedRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    context_notes: Option<String>,
}

impl From<&Chunk> for FrontMatter {
    fn from(chunk: &Chunk) -> Self {
        Self {
            id: chunk.id.clone(),
            summary: chunk.summary.clone(),
            chunk_type: chunk.chunk_type,
            epistemic: chunk.epistemic,
            status: chunk.status,
            surface_tags: chunk.surface_tags.clone(),
            created: chunk.created,
            updated: chunk.updated,
            accessed: chunk.accessed,
            retrieved_count: chunk.retrieved_count,
            relevant_count: chunk.relevant_count,
            last_relevant_date: chunk.last_relevant_date,
            related: chunk.related.clone(),
            expires: chunk.expires,
            context_notes: chunk.context_notes.clone(),
        }
    }
}

impl FrontMatter {
    fn into_chunk(self, content: String) -> Chunk {
        Chunk {
            id: self.id,
            content,
            summary: self.summary,
            chunk_type: self.chunk_type,
            epistemic: self.epistemic,
            status: self.status,
            surface_tags: self.surface_tags,
            related: self.related,
            created: self.created,
            updated: self.updated,
            accessed: self.accessed,
            retrieved_count: self.retrieved_count,
            relevant_count: self.relevant_count,
            last_relevant_date: self.last_relevant_date,
            expires: self.expires,
            context_notes: self.context_notes,
        }
    }
}

/// Serialize a chunk to its on-disk form
pub fn serialize(chunk: &Chunk) -> String {
    let header = serde_yaml::to_string(&FrontMatter::from(chunk))
        .expect("front matter serialization is infallible for valid chunks");
    format!("---\n{header}---\n\n{}", chunk.content)
}

/// Parse a chunk file
///
/// `filename` only labels errors. Rejects with `InvalidFormat` when the
/// opening `---` delimiter is missing or the header is never terminated.
pub fn parse(text: &str, filename: &str) -> Result<Chunk> {
    let rest = text
        .strip_prefix("---\n")
        .ok_or_else(|| invalid(filename, "missing opening front matter delimiter"))?;

    let end = rest
        .find("\n---")
        .ok_or_else(|| invalid(filename, "unterminated front matter"))?;

    let header: FrontMatter = serde_yaml::from_str(&rest[..end])
        .map_err(|e| invalid(filename, &e.to_string()))?;

    // Past the closing delimiter: one newline ends the `---` line, one more
    // is the blank separator. Anything beyond belongs to the body.
    let mut content = &rest[end + 4..];
    for _ in 0..2 {
        if let Some(stripped) = content.strip_prefix('\n') {
            content = stripped;
        }
    }

    Ok(header.into_chunk(content.to_string()))
}

fn invalid(filename: &str, reason: &str) -> MemoryError {
    MemoryError::InvalidFormat {
        file: filename.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkPatch;

    fn sample() -> Chunk {
        ChunkPatch {
            summary: Some("Evaluating startup equity".into()),
            chunk_type: Some(ChunkType::Framework),
            epistemic: Some(EpistemicStatus::Working),
            surface_tags: Some(vec!["startups".into(), "equity".into()]),
            ..Default::default()
        }
        .into_new_chunk("a1b2c3".into(), "Ask about strike price.\nThen vesting.".into(), Utc::now())
        .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let mut chunk = sample();
        chunk.related = vec![RelatedRef {
            id: "ffee00".into(),
            reason: "follow-up".into(),
        }];
        chunk.context_notes = Some("multi\nline notes".into());
        chunk.retrieved_count = 7;
        chunk.last_relevant_date = Some(Utc::now());

        let text = serialize(&chunk);
        let parsed = parse(&text, "a1b2c3-test.md").unwrap();
        assert_eq!(parsed, chunk);
    }

    #[test]
    fn test_round_trip_minimal() {
        let chunk = sample();
        let parsed = parse(&serialize(&chunk), "f.md").unwrap();
        assert_eq!(parsed, chunk);
    }

    #[test]
    fn test_optional_fields_omitted_when_absent() {
        let text = serialize(&sample());
        assert!(!text.contains("expires"));
        assert!(!text.contains("context_notes"));
        assert!(!text.contains("related"));
        // The relevance timestamp is always present, null when unset
        assert!(text.contains("last_relevant_date: null"));
    }

    #[test]
    fn test_missing_opening_delimiter_rejected() {
        let err = parse("id: abc123\n", "f.md").unwrap_err();
        assert_eq!(err.code(), "INVALID_FORMAT");
    }

    #[test]
    fn test_unterminated_header_rejected() {
        let err = parse("---\nid: abc123\nsummary: x\n", "f.md").unwrap_err();
        assert_eq!(err.code(), "INVALID_FORMAT");
        assert!(err.message().contains("unterminated"));
    }

    #[test]
    fn test_hand_written_file_defaults() {
        let text = "---\n\
                    id: abc123\n\
                    summary: a note\n\
                    type: fact\n\
                    epistemic: working\n\
                    created: 2025-01-01T00:00:00Z\n\
                    updated: 2025-01-02T00:00:00Z\n\
                    accessed: 2025-01-02T00:00:00Z\n\
                    some_unknown_key: ignored\n\
                    ---\n\n\
                    the body\n";
        let chunk = parse(text, "abc123-a-note.md").unwrap();
        assert_eq!(chunk.id, "abc123");
        assert_eq!(chunk.retrieved_count, 0);
        assert_eq!(chunk.relevant_count, 0);
        assert_eq!(chunk.status, LifecycleStatus::Active);
        assert!(chunk.related.is_empty());
        assert!(chunk.last_relevant_date.is_none());
        assert_eq!(chunk.content, "the body\n");
    }

    #[test]
    fn test_body_leading_newline_preserved() {
        let mut chunk = sample();
        chunk.content = "\nstarts with a blank line".into();
        let parsed = parse(&serialize(&chunk), "f.md").unwrap();
        assert_eq!(parsed.content, chunk.content);
    }

    #[test]
    fn test_empty_body() {
        let mut chunk = sample();
        chunk.content = String::new();
        let parsed = parse(&serialize(&chunk), "f.md").unwrap();
        assert_eq!(parsed.content, "");
    }
}
