use crate::{
    error::AppResult,
    models::{MediaId, Rating, Recommendation, ScoredMedia, UserId, WatchStatusKind},
};

/// Read access to rating and watch-status history
///
/// The engine never writes through this trait. Implementations must return
/// rows in a stable order so repeated batch runs over the same snapshot
/// produce identical rankings.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RatingStore: Send + Sync {
    /// Every user the batch should score, including users with no ratings
    async fn list_user_ids(&self) -> AppResult<Vec<UserId>>;

    /// A user's ratings, at most one per media item
    async fn get_ratings(&self, user_id: UserId) -> AppResult<Vec<Rating>>;

    /// Media the user has marked with any of `statuses`
    async fn get_watch_status(
        &self,
        user_id: UserId,
        statuses: &[WatchStatusKind],
    ) -> AppResult<Vec<MediaId>>;

    /// Other users who rated at least one media item the user also rated
    async fn find_co_raters(&self, user_id: UserId) -> AppResult<Vec<UserId>>;

    /// Every media item any user rated or tracks, ascending
    async fn list_media_ids(&self) -> AppResult<Vec<MediaId>>;
}

/// Write access to the recommendation table
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Upserts the user's fresh recommendation set, keyed on (user_id, media_id)
    async fn upsert_recommendations(
        &self,
        user_id: UserId,
        recommendations: &[ScoredMedia],
    ) -> AppResult<()>;

    /// Top recommendations for a user, highest score first
    async fn get_recommendations(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> AppResult<Vec<Recommendation>>;
}
