use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::MediaId;

/// Cast members kept per title, in billing order
pub const CAST_DEPTH: usize = 10;

/// Attribute snapshot of one catalog title
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MediaAttributes {
    pub media_id: MediaId,
    pub genre_ids: BTreeSet<i64>,
    /// Billing order, top-billed first
    pub cast_ids: Vec<i64>,
    pub keyword_ids: BTreeSet<i64>,
}

impl MediaAttributes {
    pub fn empty(media_id: MediaId) -> Self {
        Self {
            media_id,
            ..Default::default()
        }
    }

    /// The `n` top-billed cast members
    pub fn top_billed(&self, n: usize) -> &[i64] {
        &self.cast_ids[..self.cast_ids.len().min(n)]
    }

    pub fn is_empty(&self) -> bool {
        self.genre_ids.is_empty() && self.cast_ids.is_empty() && self.keyword_ids.is_empty()
    }
}

// ============================================================================
// TMDB API Types
// ============================================================================

/// Response of `GET /movie/{id}?append_to_response=credits,keywords`
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbMediaDetails {
    pub id: i64,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    #[serde(default)]
    pub credits: Option<TmdbCredits>,
    #[serde(default)]
    pub keywords: Option<TmdbKeywords>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbGenre {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCredits {
    #[serde(default)]
    pub cast: Vec<TmdbCastMember>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbCastMember {
    pub id: i64,
    #[serde(default)]
    pub order: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbKeywords {
    #[serde(default)]
    pub keywords: Vec<TmdbKeyword>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbKeyword {
    pub id: i64,
}

impl From<TmdbMediaDetails> for MediaAttributes {
    fn from(details: TmdbMediaDetails) -> Self {
        let mut cast = details.credits.map(|c| c.cast).unwrap_or_default();
        // Stable sort keeps response order for members without a billing position
        cast.sort_by_key(|member| member.order.unwrap_or(u32::MAX));

        let mut cast_ids = Vec::with_capacity(CAST_DEPTH);
        for member in cast {
            if cast_ids.len() == CAST_DEPTH {
                break;
            }
            if !cast_ids.contains(&member.id) {
                cast_ids.push(member.id);
            }
        }

        MediaAttributes {
            media_id: details.id,
            genre_ids: details.genres.into_iter().map(|g| g.id).collect(),
            cast_ids,
            keyword_ids: details
                .keywords
                .map(|k| k.keywords.into_iter().map(|kw| kw.id).collect())
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tmdb_details_to_attributes() {
        let json = r#"{
            "id": 27205,
            "title": "Inception",
            "genres": [{"id": 28, "name": "Action"}, {"id": 878, "name": "Science Fiction"}],
            "credits": {
                "cast": [
                    {"id": 24045, "name": "Joseph Gordon-Levitt", "order": 1},
                    {"id": 6193, "name": "Leonardo DiCaprio", "order": 0}
                ]
            },
            "keywords": {"keywords": [{"id": 1566, "name": "dream"}]}
        }"#;

        let details: TmdbMediaDetails = serde_json::from_str(json).unwrap();
        let attributes = MediaAttributes::from(details);

        assert_eq!(attributes.media_id, 27205);
        assert_eq!(attributes.genre_ids, BTreeSet::from([28, 878]));
        assert_eq!(attributes.cast_ids, vec![6193, 24045]);
        assert_eq!(attributes.keyword_ids, BTreeSet::from([1566]));
    }

    #[test]
    fn test_missing_credits_and_keywords_are_empty() {
        let json = r#"{"id": 603, "genres": [{"id": 28, "name": "Action"}]}"#;

        let details: TmdbMediaDetails = serde_json::from_str(json).unwrap();
        let attributes = MediaAttributes::from(details);

        assert_eq!(attributes.genre_ids, BTreeSet::from([28]));
        assert!(attributes.keyword_ids.is_empty());
        assert!(attributes.cast_ids.is_empty());
    }

    #[test]
    fn test_cast_truncated_to_depth() {
        let cast: Vec<String> = (0..15)
            .map(|i| format!(r#"{{"id": {}, "order": {}}}"#, 100 + i, i))
            .collect();
        let json = format!(r#"{{"id": 1, "credits": {{"cast": [{}]}}}}"#, cast.join(","));

        let details: TmdbMediaDetails = serde_json::from_str(&json).unwrap();
        let attributes = MediaAttributes::from(details);

        assert_eq!(attributes.cast_ids.len(), CAST_DEPTH);
        assert_eq!(attributes.cast_ids[0], 100);
    }

    #[test]
    fn test_top_billed_shorter_than_limit() {
        let attributes = MediaAttributes {
            media_id: 1,
            cast_ids: vec![7, 8],
            ..Default::default()
        };
        assert_eq!(attributes.top_billed(5), &[7, 8]);
        assert_eq!(attributes.top_billed(1), &[7]);
    }

    #[test]
    fn test_empty_attributes() {
        assert!(MediaAttributes::empty(42).is_empty());
    }
}
