//! HNSW graph index over unit vectors
//!
//! Hierarchical navigable small world graph with cosine distance, addressed
//! by fixed integer slots below `max_elements`. Deletes are soft: the node
//! stays in the graph for routing and is filtered from results. A tombstoned
//! slot can be re-added, which replaces its vector and relinks it.
//!
//! Incremental inserts with closest-M neighbor selection are a simplification
//! of the reference heuristic; at the target scale (<= tens of thousands of
//! points) recall stays high because `ef` is large relative to cluster sizes.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use rand::Rng;

use crate::constants::{
    DEFAULT_DIMENSION, DEFAULT_EF, DEFAULT_EF_CONSTRUCTION, DEFAULT_M, DEFAULT_MAX_ELEMENTS,
};
use crate::errors::{MemoryError, Result};

/// HNSW graph parameters
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Vector dimension
    pub dimension: usize,

    /// Slot capacity of the index
    pub max_elements: usize,

    /// Max outgoing links per node on upper layers (layer 0 gets 2*m)
    pub m: usize,

    /// Candidate list size during construction
    pub ef_construction: usize,

    /// Candidate list size during search
    pub ef: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            max_elements: DEFAULT_MAX_ELEMENTS,
            m: DEFAULT_M,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef: DEFAULT_EF,
        }
    }
}

/// Node in the HNSW graph
struct Node {
    vector: Vec<f32>,

    /// Adjacency lists, one per layer the node participates in
    links: Vec<Vec<u32>>,

    /// Soft-deleted: kept for routing, filtered from results
    deleted: bool,
}

/// Search candidate ordered by distance (ties broken by slot for determinism)
#[derive(Clone, Copy, PartialEq)]
struct Candidate {
    dist: f32,
    slot: u32,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .partial_cmp(&other.dist)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.slot.cmp(&other.slot))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Slot-addressed HNSW index
pub struct HnswBackend {
    config: HnswConfig,
    nodes: Vec<Option<Node>>,
    entry_point: Option<u32>,
    top_level: usize,
    /// Level generator normalization factor (1 / ln m)
    level_mult: f64,
    /// Count of live (non-tombstoned) points
    active: usize,
}

impl HnswBackend {
    pub fn new(config: HnswConfig) -> Self {
        let level_mult = 1.0 / (config.m.max(2) as f64).ln();
        Self {
            config,
            nodes: Vec::new(),
            entry_point: None,
            top_level: 0,
            level_mult,
            active: 0,
        }
    }

    /// Number of live points
    pub fn len(&self) -> usize {
        self.active
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// Cosine distance between unit vectors
    fn distance(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        1.0 - dot
    }

    fn dist_to(&self, query: &[f32], slot: u32) -> f32 {
        match &self.nodes[slot as usize] {
            Some(node) => Self::distance(query, &node.vector),
            None => f32::INFINITY,
        }
    }

    fn random_level(&self) -> usize {
        let r: f64 = rand::thread_rng().gen::<f64>().max(1e-12);
        ((-r.ln()) * self.level_mult).floor() as usize
    }

    /// Insert or replace the point at `slot`
    ///
    /// Replacing clears the tombstone and relinks the node at a freshly drawn
    /// level; stale incoming edges keep routing through it, which is harmless
    /// for approximate search.
    pub fn add_point(&mut self, vector: &[f32], slot: usize) -> Result<()> {
        if slot >= self.config.max_elements {
            return Err(MemoryError::CapacityExceeded {
                capacity: self.config.max_elements,
            });
        }
        assert_eq!(
            vector.len(),
            self.config.dimension,
            "vector dimension mismatch"
        );

        if self.nodes.len() <= slot {
            self.nodes.resize_with(slot + 1, || None);
        }

        let level = self.random_level();
        let was_live = matches!(&self.nodes[slot], Some(n) if !n.deleted);
        self.nodes[slot] = Some(Node {
            vector: vector.to_vec(),
            links: vec![Vec::new(); level + 1],
            deleted: false,
        });
        if !was_live {
            self.active += 1;
        }

        // The graph entry cannot be the node being replaced: its fresh link
        // lists would cut every other node off from search. Re-anchor first.
        if self.entry_point == Some(slot as u32) {
            self.reanchor_excluding(slot);
        }

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(slot as u32);
            self.top_level = level;
            return Ok(());
        };

        let query = vector;
        let mut curr = entry;
        let mut curr_dist = self.dist_to(query, curr);

        // Greedy descent through layers above the node's level
        for l in ((level + 1)..=self.top_level).rev() {
            self.greedy_step(query, &mut curr, &mut curr_dist, l);
        }

        // Link into each layer from the node's level down
        for l in (0..=level.min(self.top_level)).rev() {
            let found = self.search_layer(query, curr, self.config.ef_construction, l);
            let max_conn = if l == 0 { self.config.m * 2 } else { self.config.m };

            let selected: Vec<u32> = found
                .iter()
                .filter(|c| c.slot != slot as u32)
                .take(self.config.m)
                .map(|c| c.slot)
                .collect();

            if let Some(node) = &mut self.nodes[slot] {
                node.links[l] = selected.clone();
            }

            for &neighbor in &selected {
                self.link_back(neighbor, slot as u32, l, max_conn);
            }

            // The node itself can surface through stale incoming edges when
            // a tombstoned slot is revived; it must not anchor the descent,
            // its lower layers are not linked yet
            if let Some(closest) = found.iter().find(|c| c.slot != slot as u32) {
                curr = closest.slot;
            }
        }

        if level > self.top_level {
            self.top_level = level;
            self.entry_point = Some(slot as u32);
        }
        Ok(())
    }

    /// Soft-delete the point at `slot`; false when absent or already deleted
    pub fn mark_delete(&mut self, slot: usize) -> bool {
        match self.nodes.get_mut(slot).and_then(Option::as_mut) {
            Some(node) if !node.deleted => {
                node.deleted = true;
                self.active -= 1;
                true
            }
            _ => false,
        }
    }

    /// K nearest live points to `query`, ascending by cosine distance
    pub fn search_knn(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        let mut curr = entry;
        let mut curr_dist = self.dist_to(query, curr);
        for l in (1..=self.top_level).rev() {
            self.greedy_step(query, &mut curr, &mut curr_dist, l);
        }

        let ef = self.config.ef.max(k);
        let mut found = self.search_layer(query, curr, ef, 0);
        found.retain(|c| {
            matches!(self.nodes.get(c.slot as usize).and_then(Option::as_ref), Some(n) if !n.deleted)
        });
        found.truncate(k);
        found
            .into_iter()
            .map(|c| (c.slot as usize, c.dist))
            .collect()
    }

    /// Move `curr` to its closest neighbor at `level` until no improvement
    fn greedy_step(&self, query: &[f32], curr: &mut u32, curr_dist: &mut f32, level: usize) {
        loop {
            let mut improved = false;
            let neighbors = self.nodes[*curr as usize]
                .as_ref()
                .and_then(|n| n.links.get(level));
            let Some(neighbors) = neighbors else { return };
            for &n in neighbors.clone().iter() {
                let d = self.dist_to(query, n);
                if d < *curr_dist {
                    *curr = n;
                    *curr_dist = d;
                    improved = true;
                }
            }
            if !improved {
                return;
            }
        }
    }

    /// Best-first search over one layer, returning up to `ef` candidates
    /// ascending by distance (tombstoned nodes included for routing)
    fn search_layer(&self, query: &[f32], entry: u32, ef: usize, level: usize) -> Vec<Candidate> {
        let entry_cand = Candidate {
            dist: self.dist_to(query, entry),
            slot: entry,
        };

        let mut visited: HashSet<u32> = HashSet::new();
        visited.insert(entry);

        // Min-heap of nodes to expand, max-heap of the best `ef` seen
        let mut frontier = BinaryHeap::new();
        frontier.push(Reverse(entry_cand));
        let mut best: BinaryHeap<Candidate> = BinaryHeap::new();
        best.push(entry_cand);

        while let Some(Reverse(cand)) = frontier.pop() {
            let worst = best.peek().map(|c| c.dist).unwrap_or(f32::INFINITY);
            if cand.dist > worst && best.len() >= ef {
                break;
            }

            let neighbors = self.nodes[cand.slot as usize]
                .as_ref()
                .and_then(|n| n.links.get(level))
                .cloned()
                .unwrap_or_default();

            for n in neighbors {
                if !visited.insert(n) {
                    continue;
                }
                if self.nodes.get(n as usize).and_then(Option::as_ref).is_none() {
                    continue;
                }
                let d = self.dist_to(query, n);
                let worst = best.peek().map(|c| c.dist).unwrap_or(f32::INFINITY);
                if best.len() < ef || d < worst {
                    let c = Candidate { dist: d, slot: n };
                    frontier.push(Reverse(c));
                    best.push(c);
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        let mut out = best.into_vec();
        out.sort();
        out
    }

    /// Add a reverse edge, shrinking the neighbor's list to its closest
    /// `max_conn` when it overflows
    fn link_back(&mut self, from: u32, to: u32, level: usize, max_conn: usize) {
        let list = match self.nodes[from as usize].as_mut() {
            Some(node) if level < node.links.len() => {
                if node.links[level].contains(&to) {
                    return;
                }
                node.links[level].push(to);
                if node.links[level].len() <= max_conn {
                    return;
                }
                node.links[level].clone()
            }
            _ => return,
        };

        let base = self.nodes[from as usize]
            .as_ref()
            .map(|n| n.vector.clone())
            .unwrap_or_default();
        let mut ranked: Vec<Candidate> = list
            .into_iter()
            .map(|s| Candidate {
                dist: self.dist_to(&base, s),
                slot: s,
            })
            .collect();
        ranked.sort();
        ranked.truncate(max_conn);

        if let Some(node) = self.nodes[from as usize].as_mut() {
            node.links[level] = ranked.into_iter().map(|c| c.slot).collect();
        }
    }

    /// Pick a new entry point among nodes other than `excluded`
    fn reanchor_excluding(&mut self, excluded: usize) {
        let mut best: Option<(u32, usize)> = None;
        for (slot, node) in self.nodes.iter().enumerate() {
            if slot == excluded {
                continue;
            }
            let Some(node) = node else { continue };
            let level = node.links.len().saturating_sub(1);
            if best.map(|(_, l)| level > l).unwrap_or(true) {
                best = Some((slot as u32, level));
            }
        }
        match best {
            Some((slot, level)) => {
                self.entry_point = Some(slot);
                self.top_level = level;
            }
            None => {
                self.entry_point = None;
                self.top_level = 0;
            }
        }
    }
}
