use std::sync::Arc;

use futures::{stream, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    db::{RatingStore, RecommendationStore},
    error::AppResult,
    models::UserId,
    services::{
        providers::MediaAttributeProvider,
        recommendations::{EngineSettings, RecommendationEngine},
    },
};

/// Where a batch run currently is
///
/// With more than one user in flight the phase reflects the most recent
/// transition of any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    FetchingUsers,
    RefreshingCatalog,
    Scoring { user_id: UserId },
    Persisting { user_id: UserId },
    Done,
}

/// Outcome tally of one batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total_users: usize,
    pub success_count: usize,
    pub error_count: usize,
    /// Users never started because the run was cancelled
    pub skipped_count: usize,
    pub recommendations_written: usize,
    pub cancelled: bool,
    pub failed_users: Vec<UserId>,
}

enum UserOutcome {
    Succeeded { written: usize },
    Failed,
    Skipped,
}

/// Drives the per-user pipeline over every user and persists the results
///
/// A failing user is logged and counted; it never aborts the run. Only the
/// initial user enumeration is fatal.
pub struct BatchOrchestrator {
    ratings: Arc<dyn RatingStore>,
    recommendations: Arc<dyn RecommendationStore>,
    catalog: Arc<dyn MediaAttributeProvider>,
    engine: RecommendationEngine,
    concurrency: usize,
    dry_run: bool,
    cancel: CancellationToken,
    phase: watch::Sender<BatchPhase>,
}

impl BatchOrchestrator {
    pub fn new(
        ratings: Arc<dyn RatingStore>,
        recommendations: Arc<dyn RecommendationStore>,
        catalog: Arc<dyn MediaAttributeProvider>,
        settings: EngineSettings,
    ) -> Self {
        let engine =
            RecommendationEngine::new(Arc::clone(&ratings), Arc::clone(&catalog), settings);
        let (phase, _) = watch::channel(BatchPhase::Idle);

        Self {
            ratings,
            recommendations,
            catalog,
            engine,
            concurrency: 1,
            dry_run: false,
            cancel: CancellationToken::new(),
            phase,
        }
    }

    /// Number of users scored at the same time, at least 1
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Score users without writing anything
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn engine(&self) -> &RecommendationEngine {
        &self.engine
    }

    pub fn subscribe(&self) -> watch::Receiver<BatchPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> BatchPhase {
        *self.phase.borrow()
    }

    /// Full batch over every known user
    ///
    /// Fails only if the user list cannot be fetched.
    pub async fn run(&self) -> AppResult<BatchSummary> {
        self.phase.send_replace(BatchPhase::FetchingUsers);

        let users = match self.ratings.list_user_ids().await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch users, aborting batch");
                self.phase.send_replace(BatchPhase::Idle);
                return Err(e);
            }
        };

        Ok(self.run_for_users(users).await)
    }

    /// Batch over an explicit user list
    pub async fn run_for_users(&self, users: Vec<UserId>) -> BatchSummary {
        if !self.cancel.is_cancelled() {
            self.refresh_catalog().await;
        }

        let total = users.len();
        tracing::info!(
            total_users = total,
            concurrency = self.concurrency,
            dry_run = self.dry_run,
            "Starting recommendation batch"
        );

        let outcomes: Vec<(UserId, UserOutcome)> = stream::iter(users.into_iter().enumerate())
            .map(|(index, user_id)| async move {
                let span = tracing::info_span!("user", user_id = %user_id);
                let outcome = self
                    .process_user(user_id, index + 1, total)
                    .instrument(span)
                    .await;
                (user_id, outcome)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut summary = BatchSummary {
            total_users: total,
            ..Default::default()
        };
        for (user_id, outcome) in outcomes {
            match outcome {
                UserOutcome::Succeeded { written } => {
                    summary.success_count += 1;
                    summary.recommendations_written += written;
                }
                UserOutcome::Failed => {
                    summary.error_count += 1;
                    summary.failed_users.push(user_id);
                }
                UserOutcome::Skipped => summary.skipped_count += 1,
            }
        }
        summary.cancelled = self.cancel.is_cancelled();

        if summary.cancelled {
            tracing::warn!(
                skipped_count = summary.skipped_count,
                "Batch cancelled before all users were processed"
            );
        }

        tracing::info!(
            success_count = summary.success_count,
            error_count = summary.error_count,
            skipped_count = summary.skipped_count,
            recommendations_written = summary.recommendations_written,
            "Recommendation batch finished"
        );

        self.phase.send_replace(BatchPhase::Done);
        summary
    }

    /// Pulls attributes for every rated or tracked title into the local
    /// catalog the content-based filter scans. Failures only shrink the
    /// catalog, so they are logged and the batch goes on.
    async fn refresh_catalog(&self) {
        self.phase.send_replace(BatchPhase::RefreshingCatalog);

        let media_ids = match self.ratings.list_media_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list media, catalog not refreshed");
                return;
            }
        };
        if media_ids.is_empty() {
            return;
        }

        match self.catalog.ensure_cataloged(&media_ids).await {
            Ok(added) => tracing::debug!(added, provider = self.catalog.name(), "Catalog ready"),
            Err(e) => tracing::warn!(
                error = %e,
                transient = e.is_transient(),
                "Catalog refresh failed, scoring against the existing catalog"
            ),
        }
    }

    async fn process_user(&self, user_id: UserId, position: usize, total: usize) -> UserOutcome {
        if self.cancel.is_cancelled() {
            return UserOutcome::Skipped;
        }

        match self.score_and_persist(user_id).await {
            Ok((generated, written)) => {
                tracing::info!(position, total, generated, "Processed user");
                UserOutcome::Succeeded { written }
            }
            Err(e) => {
                tracing::error!(
                    position,
                    total,
                    error = %e,
                    transient = e.is_transient(),
                    "Failed to generate recommendations"
                );
                UserOutcome::Failed
            }
        }
    }

    /// Returns (generated, written) counts
    async fn score_and_persist(&self, user_id: UserId) -> AppResult<(usize, usize)> {
        self.phase.send_replace(BatchPhase::Scoring { user_id });
        let recommendations = self.engine.recommend(user_id).await?;

        if self.dry_run {
            for (rank, rec) in recommendations.iter().enumerate() {
                tracing::debug!(
                    rank = rank + 1,
                    media_id = rec.media_id,
                    score = rec.score,
                    algorithm = rec.algorithm_type.as_str(),
                    reason = %rec.reason,
                    "Dry run recommendation"
                );
            }
            return Ok((recommendations.len(), 0));
        }

        // An empty set is still written so stale rows get replaced
        self.phase.send_replace(BatchPhase::Persisting { user_id });
        self.recommendations
            .upsert_recommendations(user_id, &recommendations)
            .await?;

        Ok((recommendations.len(), recommendations.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::store::{MockRatingStore, MockRecommendationStore},
        error::AppError,
        models::{Rating, RatingValue},
        services::providers::MockMediaAttributeProvider,
    };
    use uuid::Uuid;

    fn cold_start_ratings(users: Vec<UserId>) -> MockRatingStore {
        let mut ratings = MockRatingStore::new();
        ratings
            .expect_list_user_ids()
            .returning(move || Ok(users.clone()));
        ratings.expect_get_ratings().returning(|_| Ok(vec![]));
        ratings.expect_list_media_ids().returning(|| Ok(vec![]));
        ratings
    }

    fn orchestrator(
        ratings: MockRatingStore,
        recommendations: MockRecommendationStore,
    ) -> BatchOrchestrator {
        with_catalog(ratings, recommendations, MockMediaAttributeProvider::new())
    }

    fn with_catalog(
        ratings: MockRatingStore,
        recommendations: MockRecommendationStore,
        catalog: MockMediaAttributeProvider,
    ) -> BatchOrchestrator {
        BatchOrchestrator::new(
            Arc::new(ratings),
            Arc::new(recommendations),
            Arc::new(catalog),
            EngineSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_user_list_failure_is_fatal() {
        let mut ratings = MockRatingStore::new();
        ratings
            .expect_list_user_ids()
            .returning(|| Err(AppError::Internal("connection refused".to_string())));

        let batch = orchestrator(ratings, MockRecommendationStore::new());
        let result = batch.run().await;

        assert!(matches!(result, Err(AppError::Internal(_))));
        assert_eq!(batch.phase(), BatchPhase::Idle);
    }

    #[tokio::test]
    async fn test_cold_start_users_still_upserted() {
        let users = vec![Uuid::from_u128(1), Uuid::from_u128(2)];
        let mut recommendations = MockRecommendationStore::new();
        recommendations
            .expect_upsert_recommendations()
            .times(2)
            .withf(|_, recs| recs.is_empty())
            .returning(|_, _| Ok(()));

        let batch = orchestrator(cold_start_ratings(users), recommendations);
        let summary = batch.run().await.unwrap();

        assert_eq!(summary.total_users, 2);
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.error_count, 0);
        assert_eq!(summary.recommendations_written, 0);
        assert_eq!(batch.phase(), BatchPhase::Done);
    }

    #[tokio::test]
    async fn test_persist_failure_counted_not_fatal() {
        let failing = Uuid::from_u128(2);
        let users = vec![Uuid::from_u128(1), failing, Uuid::from_u128(3)];
        let mut recommendations = MockRecommendationStore::new();
        recommendations
            .expect_upsert_recommendations()
            .returning(move |user_id, _| {
                if user_id == failing {
                    Err(AppError::Internal("write rejected".to_string()))
                } else {
                    Ok(())
                }
            });

        let summary = orchestrator(cold_start_ratings(users), recommendations)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.failed_users, vec![failing]);
    }

    #[tokio::test]
    async fn test_dry_run_never_writes() {
        let mut ratings = MockRatingStore::new();
        ratings
            .expect_list_user_ids()
            .returning(|| Ok(vec![Uuid::from_u128(1)]));
        ratings
            .expect_get_ratings()
            .returning(|_| Ok(vec![Rating::new(5, RatingValue::Like)]));
        ratings.expect_get_watch_status().returning(|_, _| Ok(vec![]));
        ratings.expect_find_co_raters().returning(|_| Ok(vec![]));
        ratings.expect_list_media_ids().returning(|| Ok(vec![]));
        let mut recommendations = MockRecommendationStore::new();
        recommendations.expect_upsert_recommendations().never();

        let summary = orchestrator(ratings, recommendations)
            .with_dry_run(true)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.recommendations_written, 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_everyone() {
        let users = vec![Uuid::from_u128(1), Uuid::from_u128(2)];
        let mut recommendations = MockRecommendationStore::new();
        recommendations.expect_upsert_recommendations().never();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = orchestrator(cold_start_ratings(users), recommendations)
            .with_cancellation(cancel)
            .run()
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.skipped_count, 2);
        assert_eq!(summary.success_count, 0);
    }

    #[tokio::test]
    async fn test_phase_updates_are_observable() {
        let users = vec![Uuid::from_u128(1)];
        let mut recommendations = MockRecommendationStore::new();
        recommendations
            .expect_upsert_recommendations()
            .returning(|_, _| Ok(()));

        let batch = orchestrator(cold_start_ratings(users), recommendations);
        let mut phase = batch.subscribe();
        assert_eq!(*phase.borrow(), BatchPhase::Idle);

        batch.run().await.unwrap();

        assert!(phase.has_changed().unwrap());
        assert_eq!(*phase.borrow_and_update(), BatchPhase::Done);
    }

    #[tokio::test]
    async fn test_catalog_refreshed_with_all_tracked_media() {
        let mut ratings = MockRatingStore::new();
        ratings
            .expect_list_user_ids()
            .returning(|| Ok(vec![Uuid::from_u128(1)]));
        ratings.expect_get_ratings().returning(|_| Ok(vec![]));
        ratings
            .expect_list_media_ids()
            .returning(|| Ok(vec![5, 6, 9]));
        let mut catalog = MockMediaAttributeProvider::new();
        catalog
            .expect_ensure_cataloged()
            .times(1)
            .withf(|ids| ids.to_vec() == vec![5, 6, 9])
            .returning(|ids| Ok(ids.len()));
        catalog.expect_name().return_const("mock");
        let mut recommendations = MockRecommendationStore::new();
        recommendations
            .expect_upsert_recommendations()
            .returning(|_, _| Ok(()));

        let summary = with_catalog(ratings, recommendations, catalog)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.success_count, 1);
    }

    #[tokio::test]
    async fn test_catalog_refresh_failure_not_fatal() {
        let mut ratings = MockRatingStore::new();
        ratings
            .expect_list_user_ids()
            .returning(|| Ok(vec![Uuid::from_u128(1)]));
        ratings.expect_get_ratings().returning(|_| Ok(vec![]));
        ratings.expect_list_media_ids().returning(|| Ok(vec![5]));
        let mut catalog = MockMediaAttributeProvider::new();
        catalog
            .expect_ensure_cataloged()
            .returning(|_| Err(AppError::ExternalApi("TMDB unavailable".to_string())));
        let mut recommendations = MockRecommendationStore::new();
        recommendations
            .expect_upsert_recommendations()
            .times(1)
            .returning(|_, _| Ok(()));

        let summary = with_catalog(ratings, recommendations, catalog)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.error_count, 0);
    }
}
