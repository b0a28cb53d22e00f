//! Semantic index
//!
//! Couples an embedder with the HNSW backend and presents a stable string-ID
//! surface over the backend's integer slots. Deleted slots go to a free set
//! and are reused smallest-first, so the index never needs rebuilding on
//! churn and chunk IDs stay stable for external references.

pub mod hnsw;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::embeddings::Embedder;
use crate::errors::{MemoryError, Result};
pub use hnsw::{HnswBackend, HnswConfig};

/// A semantic query hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    /// Cosine distance; lower is closer
    pub distance: f32,
}

/// String-keyed ANN index over chunk embedding texts
pub struct SemanticIndex {
    embedder: Arc<dyn Embedder>,
    config: HnswConfig,
    backend: HnswBackend,
    id_to_slot: HashMap<String, usize>,
    slot_to_id: HashMap<usize, String>,
    /// Previously freed slots, reused smallest-first
    free_slots: BTreeSet<usize>,
    /// Next never-used slot
    next_slot: usize,
}

impl SemanticIndex {
    pub fn new(embedder: Arc<dyn Embedder>, config: HnswConfig) -> Self {
        let backend = HnswBackend::new(config.clone());
        Self {
            embedder,
            config,
            backend,
            id_to_slot: HashMap::new(),
            slot_to_id: HashMap::new(),
            free_slots: BTreeSet::new(),
            next_slot: 0,
        }
    }

    /// Discard every document and allocate a fresh backend
    pub fn reset(&mut self) {
        self.backend = HnswBackend::new(self.config.clone());
        self.id_to_slot.clear();
        self.slot_to_id.clear();
        self.free_slots.clear();
        self.next_slot = 0;
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder
            .encode(text)
            .map_err(|e| MemoryError::EmbedderUnavailable(e.to_string()))
    }

    /// Add a document, replacing any existing entry under the same ID
    pub fn add_document(&mut self, id: &str, text: &str) -> Result<()> {
        if self.id_to_slot.contains_key(id) {
            self.remove_document(id);
        }

        // Embed before touching slot bookkeeping so a failed inference
        // leaves the free list untouched
        let vector = self.embed(text)?;

        let slot = match self.free_slots.iter().next().copied() {
            Some(slot) => {
                self.free_slots.remove(&slot);
                slot
            }
            None => {
                if self.next_slot >= self.config.max_elements {
                    return Err(MemoryError::CapacityExceeded {
                        capacity: self.config.max_elements,
                    });
                }
                let slot = self.next_slot;
                self.next_slot += 1;
                slot
            }
        };

        self.backend.add_point(&vector, slot)?;
        self.id_to_slot.insert(id.to_string(), slot);
        self.slot_to_id.insert(slot, id.to_string());
        debug!(id, slot, "document indexed");
        Ok(())
    }

    /// Remove a document; false when the ID is unknown
    pub fn remove_document(&mut self, id: &str) -> bool {
        let Some(slot) = self.id_to_slot.remove(id) else {
            return false;
        };
        self.slot_to_id.remove(&slot);
        self.backend.mark_delete(slot);
        self.free_slots.insert(slot);
        debug!(id, slot, "document removed from index");
        true
    }

    /// Replace a document's vector (remove + add)
    pub fn update_document(&mut self, id: &str, text: &str) -> Result<()> {
        self.remove_document(id);
        self.add_document(id, text)
    }

    /// K nearest documents, ascending by cosine distance
    ///
    /// `k` is capped at the current document count. Hits whose slot no
    /// longer maps to an ID are tombstones the backend has not observed yet
    /// and are silently dropped.
    pub fn query(&self, text: &str, k: usize) -> Result<Vec<SearchHit>> {
        let k = k.min(self.document_count());
        if k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embed(text)?;
        let hits = self.backend.search_knn(&vector, k);

        Ok(hits
            .into_iter()
            .filter_map(|(slot, distance)| {
                self.slot_to_id.get(&slot).map(|id| SearchHit {
                    id: id.clone(),
                    distance,
                })
            })
            .collect())
    }

    pub fn has_document(&self, id: &str) -> bool {
        self.id_to_slot.contains_key(id)
    }

    pub fn document_count(&self) -> usize {
        self.id_to_slot.len()
    }

    pub fn all_ids(&self) -> Vec<String> {
        self.id_to_slot.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::hash::HashEmbedder;

    fn test_index() -> SemanticIndex {
        test_index_with_capacity(64)
    }

    fn test_index_with_capacity(max_elements: usize) -> SemanticIndex {
        SemanticIndex::new(
            Arc::new(HashEmbedder::default()),
            HnswConfig {
                max_elements,
                ..HnswConfig::default()
            },
        )
    }

    #[test]
    fn test_add_query_remove() {
        let mut index = test_index();
        index.add_document("aaaaaa", "rust borrow checker").unwrap();
        index.add_document("bbbbbb", "pasta carbonara recipe").unwrap();
        assert_eq!(index.document_count(), 2);
        assert!(index.has_document("aaaaaa"));

        let hits = index.query("rust borrowing rules", 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "aaaaaa");
        assert!(hits[0].distance <= hits[1].distance);

        assert!(index.remove_document("aaaaaa"));
        assert!(!index.remove_document("aaaaaa"));
        assert_eq!(index.document_count(), 1);
        let hits = index.query("rust borrowing rules", 2).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "bbbbbb");
    }

    #[test]
    fn test_query_capped_at_document_count() {
        let mut index = test_index();
        index.add_document("aaaaaa", "one").unwrap();
        let hits = index.query("one", 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_query_empty_index() {
        let index = test_index();
        assert!(index.query("anything", 5).unwrap().is_empty());
    }

    #[test]
    fn test_freed_slots_reused_smallest_first() {
        let mut index = test_index();
        index.add_document("aaaaaa", "first").unwrap();
        index.add_document("bbbbbb", "second").unwrap();
        index.add_document("cccccc", "third").unwrap();

        index.remove_document("bbbbbb");
        index.remove_document("aaaaaa");

        // Slots 0 and 1 are free; the next add takes the smallest
        index.add_document("dddddd", "fourth").unwrap();
        assert_eq!(index.id_to_slot["dddddd"], 0);
        index.add_document("eeeeee", "fifth").unwrap();
        assert_eq!(index.id_to_slot["eeeeee"], 1);
        // And fresh slots resume after that
        index.add_document("ffffff", "sixth").unwrap();
        assert_eq!(index.id_to_slot["ffffff"], 3);
    }

    #[test]
    fn test_re_add_replaces_vector() {
        let mut index = test_index();
        index.add_document("aaaaaa", "pasta carbonara").unwrap();
        index.add_document("bbbbbb", "filler text").unwrap();
        index
            .add_document("aaaaaa", "rust borrow checker")
            .unwrap();
        assert_eq!(index.document_count(), 2);

        let hits = index.query("rust borrow checker", 1).unwrap();
        assert_eq!(hits[0].id, "aaaaaa");
        assert!(hits[0].distance < 0.01);
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut index = test_index_with_capacity(2);
        index.add_document("aaaaaa", "one").unwrap();
        index.add_document("bbbbbb", "two").unwrap();
        let err = index.add_document("cccccc", "three").unwrap_err();
        assert_eq!(err.code(), "CAPACITY_EXCEEDED");

        // Freeing a slot makes room again
        index.remove_document("aaaaaa");
        index.add_document("cccccc", "three").unwrap();
        assert_eq!(index.document_count(), 2);
    }

    #[test]
    fn test_update_document_refreshes_vector() {
        let mut index = test_index();
        index.add_document("aaaaaa", "old topic").unwrap();
        index.update_document("aaaaaa", "brand new topic").unwrap();
        assert_eq!(index.document_count(), 1);

        let hits = index.query("brand new topic", 1).unwrap();
        assert_eq!(hits[0].id, "aaaaaa");
        assert!(hits[0].distance < 0.01);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut index = test_index();
        index.add_document("aaaaaa", "one").unwrap();
        index.reset();
        assert_eq!(index.document_count(), 0);
        assert!(index.query("one", 1).unwrap().is_empty());
        // Slot numbering restarts
        index.add_document("bbbbbb", "two").unwrap();
        assert_eq!(index.id_to_slot["bbbbbb"], 0);
    }
}
