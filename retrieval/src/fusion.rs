use log::debug;
use sift_chunk::ChunkId;
use std::collections::HashMap;

/// One fused candidate: combined RRF score plus the rank it held in each
/// input list (`None` when absent).
#[derive(Debug, Clone, PartialEq)]
pub struct FusedEntry {
    pub id: ChunkId,
    pub score: f32,
    pub rank_a: Option<usize>,
    pub rank_b: Option<usize>,
}

/// Reciprocal Rank Fusion over two ranked id lists.
///
/// Each list contributes `1 / (k_const + rank)` per item (zero-based rank);
/// contributions accumulate per id and ids sort by total, descending. Scores
/// from the two modalities are never compared directly, which is why this
/// needs no normalization between vector similarity and BM25.
///
/// Ties break deterministically: the id ranked higher in `list_a` wins, then
/// the id ranked higher in `list_b`, then the lexicographically smaller id.
pub fn reciprocal_rank_fusion(
    list_a: &[ChunkId],
    list_b: &[ChunkId],
    k_const: f32,
    top_k: usize,
) -> Vec<FusedEntry> {
    debug!(
        "RRF fusion: {} + {} candidates, k={k_const}",
        list_a.len(),
        list_b.len()
    );

    let mut entries: HashMap<&ChunkId, FusedEntry> = HashMap::new();

    for (rank, id) in list_a.iter().enumerate() {
        let entry = entries.entry(id).or_insert_with(|| FusedEntry {
            id: id.clone(),
            score: 0.0,
            rank_a: None,
            rank_b: None,
        });
        entry.score += 1.0 / (k_const + rank as f32);
        entry.rank_a = Some(rank);
    }

    for (rank, id) in list_b.iter().enumerate() {
        let entry = entries.entry(id).or_insert_with(|| FusedEntry {
            id: id.clone(),
            score: 0.0,
            rank_a: None,
            rank_b: None,
        });
        entry.score += 1.0 / (k_const + rank as f32);
        entry.rank_b = Some(rank);
    }

    let mut fused: Vec<FusedEntry> = entries.into_values().collect();
    fused.sort_by(|x, y| {
        y.score
            .partial_cmp(&x.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| rank_key(x.rank_a).cmp(&rank_key(y.rank_a)))
            .then_with(|| rank_key(x.rank_b).cmp(&rank_key(y.rank_b)))
            .then_with(|| x.id.cmp(&y.id))
    });
    fused.truncate(top_k);

    debug!("RRF produced {} results", fused.len());
    fused
}

fn rank_key(rank: Option<usize>) -> usize {
    rank.unwrap_or(usize::MAX)
}
