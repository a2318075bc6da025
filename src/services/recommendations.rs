use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    db::RatingStore,
    error::AppResult,
    models::{
        MediaAttributes, MediaId, Rating, RatingValue, ScoredMedia, SimilarUser, UserId,
        WatchStatusKind,
    },
    services::{
        collaborative::collaborative_filter,
        content_based::{content_based_filter, FavoriteAttributes},
        hybrid::{self, HybridWeights},
        providers::MediaAttributeProvider,
        similarity::rank_neighbours,
    },
};

/// Scoring knobs, validated once at startup and fixed for a run
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Neighbours below this similarity do not feed collaborative filtering
    pub discovery_min_similarity: f64,
    /// Threshold for the similar-users search
    pub similar_users_min_similarity: f64,
    pub max_similar_users: usize,
    pub weights: HybridWeights,
    /// Cap on each filter's output before merging
    pub candidate_limit: usize,
    pub recommendation_limit: usize,
    pub catalog_page_size: usize,
    pub favorite_cast_limit: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            discovery_min_similarity: 0.2,
            similar_users_min_similarity: 0.3,
            max_similar_users: 50,
            weights: HybridWeights::default(),
            candidate_limit: 50,
            recommendation_limit: 50,
            catalog_page_size: 1000,
            favorite_cast_limit: 5,
        }
    }
}

/// Hybrid recommendation pipeline for a single user
///
/// Holds no per-user state: every call gathers its own inputs, so one
/// engine can score many users concurrently.
pub struct RecommendationEngine {
    ratings: Arc<dyn RatingStore>,
    catalog: Arc<dyn MediaAttributeProvider>,
    settings: EngineSettings,
}

impl RecommendationEngine {
    pub fn new(
        ratings: Arc<dyn RatingStore>,
        catalog: Arc<dyn MediaAttributeProvider>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            ratings,
            catalog,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Ranked, normalized recommendations for `user_id`
    ///
    /// A user without ratings gets an empty list. Never returns a title the
    /// user rated or is watching/has watched.
    pub async fn recommend(&self, user_id: UserId) -> AppResult<Vec<ScoredMedia>> {
        let ratings = self.ratings.get_ratings(user_id).await?;
        if ratings.is_empty() {
            tracing::debug!(user_id = %user_id, "No ratings, nothing to recommend");
            return Ok(Vec::new());
        }

        let engaged = self
            .ratings
            .get_watch_status(user_id, &WatchStatusKind::ENGAGED)
            .await?;
        let excluded: HashSet<MediaId> = ratings
            .iter()
            .map(|r| r.media_id)
            .chain(engaged)
            .collect();

        let (collaborative, content_based) = tokio::try_join!(
            self.collaborative_candidates(user_id, &ratings, &excluded),
            self.content_candidates(&ratings, &excluded),
        )?;

        let merged = hybrid::merge(
            &collaborative,
            &content_based,
            self.settings.weights,
            self.settings.recommendation_limit,
        );

        tracing::debug!(
            user_id = %user_id,
            collaborative = collaborative.len(),
            content_based = content_based.len(),
            merged = merged.len(),
            "Candidates merged"
        );

        Ok(merged)
    }

    /// Users whose taste aligns with `user_id` at the stricter threshold,
    /// most similar first
    pub async fn find_similar_users(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> AppResult<Vec<SimilarUser>> {
        let ratings = self.ratings.get_ratings(user_id).await?;
        let neighbours = self
            .neighbours(
                user_id,
                &ratings,
                self.settings.similar_users_min_similarity,
                limit,
            )
            .await?;

        Ok(neighbours.into_iter().map(|(user, _)| user).collect())
    }

    /// Co-raters at or above `min_similarity`, with their ratings
    async fn neighbours(
        &self,
        user_id: UserId,
        ratings: &[Rating],
        min_similarity: f64,
        limit: usize,
    ) -> AppResult<Vec<(SimilarUser, Vec<Rating>)>> {
        if ratings.is_empty() {
            return Ok(Vec::new());
        }

        let co_raters = self.ratings.find_co_raters(user_id).await?;
        let mut candidates = Vec::with_capacity(co_raters.len());
        for other in co_raters {
            if other == user_id {
                continue;
            }
            let theirs = self.ratings.get_ratings(other).await?;
            candidates.push((other, theirs));
        }

        Ok(rank_neighbours(ratings, candidates, min_similarity, limit))
    }

    async fn collaborative_candidates(
        &self,
        user_id: UserId,
        ratings: &[Rating],
        excluded: &HashSet<MediaId>,
    ) -> AppResult<Vec<ScoredMedia>> {
        let neighbours = self
            .neighbours(
                user_id,
                ratings,
                self.settings.discovery_min_similarity,
                self.settings.max_similar_users,
            )
            .await?;

        Ok(collaborative_filter(
            &neighbours,
            excluded,
            self.settings.candidate_limit,
        ))
    }

    async fn content_candidates(
        &self,
        ratings: &[Rating],
        excluded: &HashSet<MediaId>,
    ) -> AppResult<Vec<ScoredMedia>> {
        let loved: Vec<MediaId> = ratings
            .iter()
            .filter(|r| r.value == RatingValue::Love)
            .map(|r| r.media_id)
            .collect();
        if loved.is_empty() {
            return Ok(Vec::new());
        }

        let mut loved_attributes: Vec<MediaAttributes> = Vec::with_capacity(loved.len());
        for media_id in loved {
            match self.catalog.get_media_attributes(media_id).await? {
                Some(attributes) => loved_attributes.push(attributes),
                None => tracing::debug!(
                    media_id,
                    provider = self.catalog.name(),
                    "No attribute data for loved title"
                ),
            }
        }

        let favorites =
            FavoriteAttributes::from_loved(&loved_attributes, self.settings.favorite_cast_limit);
        if favorites.is_empty() {
            return Ok(Vec::new());
        }

        let catalog = self.catalog.catalog(self.settings.catalog_page_size).await?;

        Ok(content_based_filter(
            &favorites,
            &catalog,
            excluded,
            self.settings.candidate_limit,
        ))
    }
}
