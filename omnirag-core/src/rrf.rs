//! Reciprocal Rank Fusion: score = Σ 1/(k + rank_i)
//!
//! Combines ranked record lists from different retrieval methods into one
//! ranking without normalising their scores against each other.

use std::collections::HashMap;

use crate::store::{ScoredRecord, record_key};

/// Default smoothing constant.
pub const DEFAULT_RRF_K: u32 = 60;

/// Fuse ranked lists and return at most `limit` records, best first.
///
/// Ranks are 1-based positions within each list. Records are identified by
/// [`record_key`]; the attributes of the first occurrence are kept. Ties keep
/// first-seen order, so the result is deterministic.
pub fn reciprocal_rank_fusion(
    ranked_lists: &[Vec<ScoredRecord>],
    k: u32,
    limit: usize,
) -> Vec<ScoredRecord> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut fused: Vec<ScoredRecord> = Vec::new();

    for list in ranked_lists {
        for (idx, record) in list.iter().enumerate() {
            let contribution = 1.0 / (k as f64 + (idx + 1) as f64);
            let key = record_key(&record.attributes);
            match positions.get(&key) {
                Some(&pos) => fused[pos].score += contribution,
                None => {
                    positions.insert(key, fused.len());
                    fused.push(ScoredRecord {
                        attributes: record.attributes.clone(),
                        score: contribution,
                    });
                }
            }
        }
    }

    // Stable sort keeps first-seen order among equal scores.
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(limit);
    fused
}
