use std::collections::{BTreeSet, HashSet};

use crate::models::{AlgorithmType, MediaAttributes, MediaId, ScoredMedia};

const GENRE_WEIGHT: f64 = 0.5;
const CAST_WEIGHT: f64 = 0.3;
const KEYWORD_WEIGHT: f64 = 0.2;

/// Attribute sets pooled from everything a user loved
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FavoriteAttributes {
    pub genres: BTreeSet<i64>,
    pub cast: BTreeSet<i64>,
    pub keywords: BTreeSet<i64>,
}

impl FavoriteAttributes {
    /// Unions genres, keywords and the `cast_limit` top-billed cast of each
    /// loved title
    pub fn from_loved(loved: &[MediaAttributes], cast_limit: usize) -> Self {
        let mut favorites = Self::default();
        for attributes in loved {
            favorites.genres.extend(attributes.genre_ids.iter().copied());
            favorites
                .cast
                .extend(attributes.top_billed(cast_limit).iter().copied());
            favorites
                .keywords
                .extend(attributes.keyword_ids.iter().copied());
        }
        favorites
    }

    /// Cold start for the content filter
    pub fn is_empty(&self) -> bool {
        self.genres.is_empty() && self.cast.is_empty() && self.keywords.is_empty()
    }
}

struct Overlap {
    genres: usize,
    cast: usize,
    keywords: usize,
}

impl Overlap {
    fn between(favorites: &FavoriteAttributes, item: &MediaAttributes) -> Self {
        Self {
            genres: item.genre_ids.intersection(&favorites.genres).count(),
            cast: item
                .cast_ids
                .iter()
                .copied()
                .collect::<BTreeSet<i64>>()
                .intersection(&favorites.cast)
                .count(),
            keywords: item.keyword_ids.intersection(&favorites.keywords).count(),
        }
    }

    fn score(&self) -> f64 {
        GENRE_WEIGHT * self.genres as f64
            + CAST_WEIGHT * self.cast as f64
            + KEYWORD_WEIGHT * self.keywords as f64
    }

    fn reason(&self) -> String {
        let parts: Vec<String> = [
            (self.genres, "genre", "genres"),
            (self.cast, "actor", "actors"),
            (self.keywords, "keyword", "keywords"),
        ]
        .into_iter()
        .filter(|(count, _, _)| *count > 0)
        .map(|(count, one, many)| {
            format!("{} {}", count, if count == 1 { one } else { many })
        })
        .collect();

        format!("Shares {}", parts.join(", "))
    }
}

/// Content-based filtering over a catalog page
///
/// `score = 0.5 × shared genres + 0.3 × shared cast + 0.2 × shared keywords`.
/// Titles in `excluded` and titles scoring 0 are dropped. Output is sorted by
/// score, highest first, and truncated to `limit`; equal scores keep catalog
/// order.
pub fn content_based_filter(
    favorites: &FavoriteAttributes,
    catalog: &[MediaAttributes],
    excluded: &HashSet<MediaId>,
    limit: usize,
) -> Vec<ScoredMedia> {
    if favorites.is_empty() {
        return Vec::new();
    }

    let mut seen: HashSet<MediaId> = HashSet::new();
    let mut scored: Vec<ScoredMedia> = catalog
        .iter()
        .filter(|item| !excluded.contains(&item.media_id))
        .filter(|item| seen.insert(item.media_id))
        .filter_map(|item| {
            let overlap = Overlap::between(favorites, item);
            let score = overlap.score();
            (score > 0.0).then(|| ScoredMedia {
                media_id: item.media_id,
                score,
                algorithm_type: AlgorithmType::ContentBased,
                reason: overlap.reason(),
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(
        media_id: MediaId,
        genres: &[i64],
        cast: &[i64],
        keywords: &[i64],
    ) -> MediaAttributes {
        MediaAttributes {
            media_id,
            genre_ids: genres.iter().copied().collect(),
            cast_ids: cast.to_vec(),
            keyword_ids: keywords.iter().copied().collect(),
        }
    }

    #[test]
    fn test_no_loved_media_is_cold_start() {
        let favorites = FavoriteAttributes::from_loved(&[], 5);
        assert!(favorites.is_empty());

        let catalog = vec![attrs(1, &[1], &[], &[])];
        assert!(content_based_filter(&favorites, &catalog, &HashSet::new(), 10).is_empty());
    }

    #[test]
    fn test_loved_media_without_attributes_is_cold_start() {
        let favorites = FavoriteAttributes::from_loved(&[MediaAttributes::empty(9)], 5);
        assert!(favorites.is_empty());
    }

    #[test]
    fn test_favorites_take_top_billed_cast_only() {
        let loved = attrs(1, &[], &[10, 11, 12, 13, 14, 15, 16], &[]);
        let favorites = FavoriteAttributes::from_loved(&[loved], 5);
        assert_eq!(favorites.cast, BTreeSet::from([10, 11, 12, 13, 14]));
    }

    #[test]
    fn test_single_shared_genre_scores_half() {
        let favorites = FavoriteAttributes::from_loved(&[attrs(1, &[1, 2], &[], &[])], 5);
        let catalog = vec![attrs(2, &[2, 3], &[], &[])];

        let result = content_based_filter(&favorites, &catalog, &HashSet::new(), 10);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].media_id, 2);
        assert_eq!(result[0].score, 0.5);
        assert_eq!(result[0].reason, "Shares 1 genre");
        assert_eq!(result[0].algorithm_type, AlgorithmType::ContentBased);
    }

    #[test]
    fn test_weighted_overlap_and_reason() {
        let favorites = FavoriteAttributes::from_loved(
            &[
                attrs(1, &[1, 2], &[100], &[500]),
                attrs(2, &[3], &[101], &[]),
            ],
            5,
        );
        let catalog = vec![attrs(3, &[1, 3, 9], &[101, 200], &[500, 501])];

        let result = content_based_filter(&favorites, &catalog, &HashSet::new(), 10);

        assert!((result[0].score - (0.5 * 2.0 + 0.3 + 0.2)).abs() < 1e-12);
        assert_eq!(result[0].reason, "Shares 2 genres, 1 actor, 1 keyword");
    }

    #[test]
    fn test_zero_overlap_dropped() {
        let favorites = FavoriteAttributes::from_loved(&[attrs(1, &[1], &[], &[])], 5);
        let catalog = vec![attrs(2, &[7], &[8], &[9]), attrs(3, &[1], &[], &[])];

        let result = content_based_filter(&favorites, &catalog, &HashSet::new(), 10);

        let ids: Vec<MediaId> = result.iter().map(|r| r.media_id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn test_excluded_media_never_emitted() {
        let loved = attrs(1, &[1], &[], &[]);
        let favorites = FavoriteAttributes::from_loved(&[loved.clone()], 5);
        let catalog = vec![loved, attrs(2, &[1], &[], &[]), attrs(3, &[1], &[], &[])];
        let excluded = HashSet::from([1, 3]);

        let result = content_based_filter(&favorites, &catalog, &excluded, 10);

        let ids: Vec<MediaId> = result.iter().map(|r| r.media_id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_sorted_and_truncated() {
        let favorites = FavoriteAttributes::from_loved(&[attrs(1, &[1, 2, 3], &[], &[])], 5);
        let catalog = vec![
            attrs(10, &[1], &[], &[]),
            attrs(11, &[1, 2, 3], &[], &[]),
            attrs(12, &[1, 2], &[], &[]),
        ];

        let result = content_based_filter(&favorites, &catalog, &HashSet::new(), 2);

        let ids: Vec<MediaId> = result.iter().map(|r| r.media_id).collect();
        assert_eq!(ids, vec![11, 12]);
    }

    #[test]
    fn test_duplicate_catalog_rows_scored_once() {
        let favorites = FavoriteAttributes::from_loved(&[attrs(1, &[1], &[], &[])], 5);
        let catalog = vec![attrs(2, &[1], &[], &[]), attrs(2, &[1], &[], &[])];

        let result = content_based_filter(&favorites, &catalog, &HashSet::new(), 10);
        assert_eq!(result.len(), 1);
    }
}
