//! Relevance filtering of search hits.
//!
//! One policy, not configurable per caller: a hit survives iff its distance
//! (`1 - similarity`) is at most the threshold. Scores are never compared
//! against the threshold directly.

use super::store::SearchHit;

#[derive(Debug, Clone, Copy, Default)]
pub struct RelevanceFilter;

impl RelevanceFilter {
    pub fn new() -> Self {
        Self
    }

    pub fn accepts(&self, hit: &SearchHit, threshold: f32) -> bool {
        hit.distance() <= threshold
    }

    /// Order-preserving subsequence of `hits` within `threshold` distance.
    /// An empty result is a normal outcome.
    pub fn filter(&self, hits: &[SearchHit], threshold: f32) -> Vec<SearchHit> {
        hits.iter()
            .filter(|hit| self.accepts(hit, threshold))
            .cloned()
            .collect()
    }
}
