use std::collections::BTreeMap;

use crate::models::{MediaId, Rating, SimilarUser, UserId};

/// Cosine similarity between two users' rating vectors
///
/// Ratings map onto `meh = -1, like = 0, love = 1` over the union of rated
/// media; a title rated by only one side contributes 0 for the other. An
/// empty or all-zero vector carries no signal and yields 0.
///
/// Both vectors are walked in media-id order, so `cosine_similarity(a, b)`
/// and `cosine_similarity(b, a)` are bit-for-bit identical.
pub fn cosine_similarity(a: &[Rating], b: &[Rating]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let left = rating_vector(a);
    let right = rating_vector(b);

    let dot: f64 = left
        .iter()
        .filter_map(|(media_id, l)| right.get(media_id).map(|r| l * r))
        .sum();

    let left_sq: f64 = left.values().map(|v| v * v).sum();
    let right_sq: f64 = right.values().map(|v| v * v).sum();

    if left_sq == 0.0 || right_sq == 0.0 {
        return 0.0;
    }

    // sqrt of the product rather than product of sqrts: exact for identical vectors
    (dot / (left_sq * right_sq).sqrt()).clamp(-1.0, 1.0)
}

fn rating_vector(ratings: &[Rating]) -> BTreeMap<MediaId, f64> {
    ratings
        .iter()
        .map(|r| (r.media_id, r.value.vector_value()))
        .collect()
}

/// Scores every candidate against the target's ratings, keeps those at or
/// above `min_similarity`, and returns the `limit` most similar, highest
/// first. Ties fall back to user id so the order is reproducible.
pub fn rank_neighbours(
    target: &[Rating],
    candidates: Vec<(UserId, Vec<Rating>)>,
    min_similarity: f64,
    limit: usize,
) -> Vec<(SimilarUser, Vec<Rating>)> {
    let mut neighbours: Vec<(SimilarUser, Vec<Rating>)> = candidates
        .into_iter()
        .filter_map(|(user_id, ratings)| {
            let similarity = cosine_similarity(target, &ratings);
            (similarity >= min_similarity).then_some((
                SimilarUser {
                    user_id,
                    similarity,
                },
                ratings,
            ))
        })
        .collect();

    neighbours.sort_by(|(a, _), (b, _)| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
    neighbours.truncate(limit);
    neighbours
}
