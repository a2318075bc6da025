use std::collections::HashMap;

use crate::models::{AlgorithmType, MediaId, ScoredMedia};

/// Blend of the two filters. Collaborative signal is weighted higher by
/// default; both values are configuration, not derived.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridWeights {
    pub collaborative: f64,
    pub content_based: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            collaborative: 0.6,
            content_based: 0.4,
        }
    }
}

/// Merges both candidate lists into one ranked list with scores in [0, 1]
///
/// Collaborative entries are taken first at `score × collaborative`. A
/// content-based entry for a title already present folds into it as
/// `existing × collaborative + score × content_based`, becomes `hybrid`, and
/// joins both reasons with " + "; other content-based entries are taken at
/// `score × content_based`. Scores are then divided by the maximum so the
/// top entry is exactly 1 (the divisor falls back to 1 when every score is
/// 0). Output is sorted highest first and truncated to `limit`; equal
/// scores keep first-seen order, collaborative entries first.
pub fn merge(
    collaborative: &[ScoredMedia],
    content_based: &[ScoredMedia],
    weights: HybridWeights,
    limit: usize,
) -> Vec<ScoredMedia> {
    let mut merged: Vec<ScoredMedia> = Vec::new();
    let mut index: HashMap<MediaId, usize> = HashMap::new();

    for candidate in collaborative {
        if index.contains_key(&candidate.media_id) {
            continue;
        }
        index.insert(candidate.media_id, merged.len());
        merged.push(ScoredMedia {
            media_id: candidate.media_id,
            score: candidate.score * weights.collaborative,
            algorithm_type: AlgorithmType::Collaborative,
            reason: candidate.reason.clone(),
        });
    }

    for candidate in content_based {
        match index.get(&candidate.media_id) {
            Some(&slot) => {
                let existing = &mut merged[slot];
                // Duplicate content-based entry for the same title
                if existing.algorithm_type != AlgorithmType::Collaborative {
                    continue;
                }
                existing.score = existing.score * weights.collaborative
                    + candidate.score * weights.content_based;
                existing.algorithm_type = AlgorithmType::Hybrid;
                existing.reason = format!("{} + {}", existing.reason, candidate.reason);
            }
            None => {
                index.insert(candidate.media_id, merged.len());
                merged.push(ScoredMedia {
                    media_id: candidate.media_id,
                    score: candidate.score * weights.content_based,
                    algorithm_type: AlgorithmType::ContentBased,
                    reason: candidate.reason.clone(),
                });
            }
        }
    }

    let max_score = merged.iter().map(|m| m.score).fold(0.0_f64, f64::max);
    let denominator = if max_score > 0.0 { max_score } else { 1.0 };
    for entry in &mut merged {
        entry.score = (entry.score / denominator).clamp(0.0, 1.0);
    }

    merged.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.truncate(limit);
    merged
}
