//! Hybrid-search merge helper shared by every vector-searchable class (§4.5):
//! compute an embedding result set and a BM25 result set, each capped at
//! `2 * limit`, then merge by id with `score = w_vec * sim + w_bm25 * rank_score`.

use std::collections::HashMap;

use uuid::Uuid;

use mnemo_core::memory::{DEFAULT_BM25_WEIGHT, DEFAULT_VECTOR_WEIGHT};

/// BM25 scores aren't bounded to `[0, 1]` the way cosine similarity is; rescale
/// by the top score in this result set so the weighted sum stays comparable.
#[must_use]
pub fn normalize_bm25(hits: &[(Uuid, f64)]) -> HashMap<Uuid, f64> {
    let max = hits.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
    hits.iter()
        .map(|(id, s)| (*id, if max > 0.0 { s / max } else { 0.0 }))
        .collect()
}

/// Merges a vector result set and a BM25 result set into one weighted score
/// per id. Ids present in only one set still get a (partial) score.
#[must_use]
pub fn merge_weighted(
    vector_hits: &[(Uuid, f64)],
    bm25_hits: &[(Uuid, f64)],
    w_vec: f64,
    w_bm25: f64,
) -> HashMap<Uuid, f64> {
    let mut merged: HashMap<Uuid, f64> = HashMap::new();
    for (id, sim) in vector_hits {
        *merged.entry(*id).or_insert(0.0) += w_vec * sim;
    }
    for (id, rank) in normalize_bm25(bm25_hits) {
        *merged.entry(id).or_insert(0.0) += w_bm25 * rank;
    }
    merged
}

#[must_use]
pub const fn default_weights() -> (f64, f64) {
    (DEFAULT_VECTOR_WEIGHT, DEFAULT_BM25_WEIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_and_weights_both_sets() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let vector_hits = vec![(a, 0.9), (b, 0.4)];
        let bm25_hits = vec![(a, 5.0), (b, 10.0)];
        let merged = merge_weighted(&vector_hits, &bm25_hits, 0.7, 0.3);
        // b has the lower vector score but the top bm25 score.
        assert!(merged[&b] > 0.0);
        assert!(merged[&a] > 0.0);
    }

    #[test]
    fn id_present_only_in_one_set_still_scores() {
        let a = Uuid::now_v7();
        let vector_hits = vec![(a, 0.8)];
        let bm25_hits: Vec<(Uuid, f64)> = Vec::new();
        let merged = merge_weighted(&vector_hits, &bm25_hits, 0.7, 0.3);
        assert!((merged[&a] - 0.56).abs() < 1e-9);
    }

    #[test]
    fn empty_bm25_set_normalizes_to_zero() {
        let norm = normalize_bm25(&[]);
        assert!(norm.is_empty());
    }
}
