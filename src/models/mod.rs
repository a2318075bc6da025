use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use uuid::Uuid;

use crate::error::AppError;

pub mod media;

pub use media::{MediaAttributes, TmdbMediaDetails};

pub type UserId = Uuid;

/// Catalog-wide media identifier (TMDB id)
pub type MediaId = i64;

/// A user's qualitative reaction to a media item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RatingValue {
    Meh,
    Like,
    Love,
}

impl RatingValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatingValue::Meh => "meh",
            RatingValue::Like => "like",
            RatingValue::Love => "love",
        }
    }

    /// Position on the -1..1 scale used for rating vectors
    pub fn vector_value(&self) -> f64 {
        match self {
            RatingValue::Meh => -1.0,
            RatingValue::Like => 0.0,
            RatingValue::Love => 1.0,
        }
    }

    /// Weight a neighbour's rating carries in collaborative scoring.
    /// `None` for ratings that never produce a candidate.
    pub fn collaborative_weight(&self) -> Option<f64> {
        match self {
            RatingValue::Love => Some(1.0),
            RatingValue::Like => Some(0.7),
            RatingValue::Meh => None,
        }
    }
}

impl FromStr for RatingValue {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meh" => Ok(RatingValue::Meh),
            "like" => Ok(RatingValue::Like),
            "love" => Ok(RatingValue::Love),
            other => Err(AppError::Internal(format!("Unknown rating value: {}", other))),
        }
    }
}

impl Display for RatingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WatchStatusKind {
    Want,
    Watching,
    Watched,
}

impl WatchStatusKind {
    /// Statuses that exclude a title from recommendations
    pub const ENGAGED: [WatchStatusKind; 2] = [WatchStatusKind::Watching, WatchStatusKind::Watched];

    pub fn as_str(&self) -> &'static str {
        match self {
            WatchStatusKind::Want => "want",
            WatchStatusKind::Watching => "watching",
            WatchStatusKind::Watched => "watched",
        }
    }
}

impl FromStr for WatchStatusKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "want" => Ok(WatchStatusKind::Want),
            "watching" => Ok(WatchStatusKind::Watching),
            "watched" => Ok(WatchStatusKind::Watched),
            other => Err(AppError::Internal(format!("Unknown watch status: {}", other))),
        }
    }
}

/// One rating from a user's history
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    pub media_id: MediaId,
    pub value: RatingValue,
}

impl Rating {
    pub fn new(media_id: MediaId, value: RatingValue) -> Self {
        Self { media_id, value }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmType {
    Collaborative,
    ContentBased,
    Hybrid,
}

impl AlgorithmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmType::Collaborative => "collaborative",
            AlgorithmType::ContentBased => "content_based",
            AlgorithmType::Hybrid => "hybrid",
        }
    }
}

impl FromStr for AlgorithmType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collaborative" => Ok(AlgorithmType::Collaborative),
            "content_based" => Ok(AlgorithmType::ContentBased),
            "hybrid" => Ok(AlgorithmType::Hybrid),
            other => Err(AppError::Internal(format!("Unknown algorithm type: {}", other))),
        }
    }
}

/// A scored candidate produced by a filter or by the hybrid merger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredMedia {
    pub media_id: MediaId,
    pub score: f64,
    pub algorithm_type: AlgorithmType,
    pub reason: String,
}

/// Another user whose taste aligns with the target user
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SimilarUser {
    pub user_id: UserId,
    pub similarity: f64,
}

/// A persisted recommendation row as read by the feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub user_id: UserId,
    pub media_id: MediaId,
    pub score: f64,
    pub algorithm_type: AlgorithmType,
    pub reason: String,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_vector_values() {
        assert_eq!(RatingValue::Meh.vector_value(), -1.0);
        assert_eq!(RatingValue::Like.vector_value(), 0.0);
        assert_eq!(RatingValue::Love.vector_value(), 1.0);
    }

    #[test]
    fn test_rating_collaborative_weights() {
        assert_eq!(RatingValue::Love.collaborative_weight(), Some(1.0));
        assert_eq!(RatingValue::Like.collaborative_weight(), Some(0.7));
        assert_eq!(RatingValue::Meh.collaborative_weight(), None);
    }

    #[test]
    fn test_rating_value_parse() {
        assert_eq!("love".parse::<RatingValue>().unwrap(), RatingValue::Love);
        assert!("adore".parse::<RatingValue>().is_err());
    }

    #[test]
    fn test_rating_value_serialization() {
        let json = serde_json::to_string(&RatingValue::Meh).unwrap();
        assert_eq!(json, "\"meh\"");
    }

    #[test]
    fn test_watch_status_parse_round_trip() {
        for status in [
            WatchStatusKind::Want,
            WatchStatusKind::Watching,
            WatchStatusKind::Watched,
        ] {
            assert_eq!(status.as_str().parse::<WatchStatusKind>().unwrap(), status);
        }
    }

    #[test]
    fn test_algorithm_type_serialization() {
        let json = serde_json::to_string(&AlgorithmType::ContentBased).unwrap();
        assert_eq!(json, "\"content_based\"");
        assert_eq!(
            "hybrid".parse::<AlgorithmType>().unwrap(),
            AlgorithmType::Hybrid
        );
    }
}
