use std::collections::{HashMap, HashSet};

use crate::models::{AlgorithmType, MediaId, Rating, ScoredMedia, SimilarUser, UserId};

struct Accumulator {
    media_id: MediaId,
    score: f64,
    raters: HashSet<UserId>,
}

/// User-user collaborative filtering
///
/// For every like/love from a neighbour on a title outside `excluded`:
/// `score[media] += similarity × weight` with love = 1.0 and like = 0.7.
/// `neighbours` are expected to be pre-filtered to the similarity threshold.
///
/// Output is sorted by score, highest first, and truncated to `limit`.
/// Equal scores keep first-seen order.
pub fn collaborative_filter(
    neighbours: &[(SimilarUser, Vec<Rating>)],
    excluded: &HashSet<MediaId>,
    limit: usize,
) -> Vec<ScoredMedia> {
    let mut candidates: Vec<Accumulator> = Vec::new();
    let mut index: HashMap<MediaId, usize> = HashMap::new();

    for (neighbour, ratings) in neighbours {
        for rating in ratings {
            let Some(weight) = rating.value.collaborative_weight() else {
                continue;
            };
            if excluded.contains(&rating.media_id) {
                continue;
            }

            let slot = *index.entry(rating.media_id).or_insert_with(|| {
                candidates.push(Accumulator {
                    media_id: rating.media_id,
                    score: 0.0,
                    raters: HashSet::new(),
                });
                candidates.len() - 1
            });

            let candidate = &mut candidates[slot];
            candidate.score += neighbour.similarity * weight;
            candidate.raters.insert(neighbour.user_id);
        }
    }

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(limit);

    candidates
        .into_iter()
        .map(|c| ScoredMedia {
            media_id: c.media_id,
            score: c.score,
            algorithm_type: AlgorithmType::Collaborative,
            reason: liked_by_reason(c.raters.len()),
        })
        .collect()
}

fn liked_by_reason(raters: usize) -> String {
    if raters == 1 {
        "Liked by 1 similar user".to_string()
    } else {
        format!("Liked by {} similar users", raters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RatingValue::{Like, Love, Meh};
    use uuid::Uuid;

    fn neighbour(
        id: u128,
        similarity: f64,
        rated: &[(MediaId, crate::models::RatingValue)],
    ) -> (SimilarUser, Vec<Rating>) {
        (
            SimilarUser {
                user_id: Uuid::from_u128(id),
                similarity,
            },
            rated.iter().map(|&(m, v)| Rating::new(m, v)).collect(),
        )
    }

    #[test]
    fn test_no_neighbours_is_empty() {
        assert!(collaborative_filter(&[], &HashSet::new(), 10).is_empty());
    }

    #[test]
    fn test_scores_accumulate_across_neighbours() {
        let neighbours = vec![
            neighbour(1, 0.8, &[(10, Love), (11, Like)]),
            neighbour(2, 0.5, &[(10, Like)]),
        ];

        let result = collaborative_filter(&neighbours, &HashSet::new(), 10);

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].media_id, 10);
        assert!((result[0].score - (0.8 + 0.5 * 0.7)).abs() < 1e-12);
        assert_eq!(result[0].reason, "Liked by 2 similar users");
        assert_eq!(result[1].media_id, 11);
        assert!((result[1].score - 0.56).abs() < 1e-12);
        assert_eq!(result[1].reason, "Liked by 1 similar user");
        assert!(result
            .iter()
            .all(|r| r.algorithm_type == AlgorithmType::Collaborative));
    }

    #[test]
    fn test_meh_ratings_never_contribute() {
        let neighbours = vec![neighbour(1, 0.9, &[(10, Meh)])];
        assert!(collaborative_filter(&neighbours, &HashSet::new(), 10).is_empty());
    }

    #[test]
    fn test_excluded_media_never_emitted() {
        let neighbours = vec![neighbour(1, 0.9, &[(10, Love), (11, Love), (12, Like)])];
        let excluded = HashSet::from([10, 12]);

        let result = collaborative_filter(&neighbours, &excluded, 10);

        let ids: Vec<MediaId> = result.iter().map(|r| r.media_id).collect();
        assert_eq!(ids, vec![11]);
    }

    #[test]
    fn test_truncated_to_limit() {
        let neighbours = vec![neighbour(
            1,
            0.5,
            &[(1, Love), (2, Like), (3, Love), (4, Like)],
        )];

        let result = collaborative_filter(&neighbours, &HashSet::new(), 2);

        let ids: Vec<MediaId> = result.iter().map(|r| r.media_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let neighbours = vec![neighbour(1, 0.5, &[(30, Love), (20, Love), (10, Love)])];

        let result = collaborative_filter(&neighbours, &HashSet::new(), 10);

        let ids: Vec<MediaId> = result.iter().map(|r| r.media_id).collect();
        assert_eq!(ids, vec![30, 20, 10]);
    }
}
