use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use crate::{
    db::store::{RatingStore, RecommendationStore},
    error::AppResult,
    models::{MediaId, Rating, Recommendation, ScoredMedia, UserId, WatchStatusKind},
};

/// Connects a PostgreSQL pool capped at `max_connections`
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the migrations bundled in `migrations/`
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

#[derive(FromRow)]
struct RatingRow {
    media_id: i64,
    value: String,
}

#[derive(FromRow)]
struct RecommendationRow {
    user_id: UserId,
    media_id: i64,
    score: f64,
    algorithm_type: String,
    reason: String,
    generated_at: DateTime<Utc>,
}

/// PostgreSQL-backed rating reads and recommendation writes
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    /// Delete rows that dropped out of the fresh set after each upsert
    purge_stale: bool,
}

impl PgStore {
    pub fn new(pool: PgPool, purge_stale: bool) -> Self {
        Self { pool, purge_stale }
    }
}

#[async_trait::async_trait]
impl RatingStore for PgStore {
    async fn list_user_ids(&self) -> AppResult<Vec<UserId>> {
        let ids = sqlx::query_scalar::<_, UserId>("SELECT id FROM profiles ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn get_ratings(&self, user_id: UserId) -> AppResult<Vec<Rating>> {
        let rows = sqlx::query_as::<_, RatingRow>(
            r#"
            SELECT media_id, value
            FROM ratings
            WHERE user_id = $1
            ORDER BY media_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> AppResult<Rating> {
                Ok(Rating::new(row.media_id, row.value.parse()?))
            })
            .collect()
    }

    async fn get_watch_status(
        &self,
        user_id: UserId,
        statuses: &[WatchStatusKind],
    ) -> AppResult<Vec<MediaId>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();

        let media_ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT media_id
            FROM watch_status
            WHERE user_id = $1 AND status = ANY($2)
            ORDER BY media_id
            "#,
        )
        .bind(user_id)
        .bind(&statuses)
        .fetch_all(&self.pool)
        .await?;

        Ok(media_ids)
    }

    async fn find_co_raters(&self, user_id: UserId) -> AppResult<Vec<UserId>> {
        let ids = sqlx::query_scalar::<_, UserId>(
            r#"
            SELECT DISTINCT other.user_id
            FROM ratings mine
            JOIN ratings other
              ON other.media_id = mine.media_id AND other.user_id <> mine.user_id
            WHERE mine.user_id = $1
            ORDER BY other.user_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn list_media_ids(&self) -> AppResult<Vec<MediaId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT media_id FROM ratings
            UNION
            SELECT media_id FROM watch_status
            ORDER BY media_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl RecommendationStore for PgStore {
    async fn upsert_recommendations(
        &self,
        user_id: UserId,
        recommendations: &[ScoredMedia],
    ) -> AppResult<()> {
        let media_ids: Vec<i64> = recommendations.iter().map(|r| r.media_id).collect();
        let scores: Vec<f64> = recommendations.iter().map(|r| r.score).collect();
        let algorithms: Vec<String> = recommendations
            .iter()
            .map(|r| r.algorithm_type.as_str().to_string())
            .collect();
        let reasons: Vec<String> = recommendations.iter().map(|r| r.reason.clone()).collect();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO recommendations (user_id, media_id, score, algorithm_type, reason, generated_at)
            SELECT $1, t.media_id, t.score, t.algorithm_type, t.reason, $6
            FROM UNNEST($2::BIGINT[], $3::DOUBLE PRECISION[], $4::TEXT[], $5::TEXT[])
                AS t(media_id, score, algorithm_type, reason)
            ON CONFLICT (user_id, media_id) DO UPDATE SET
                score = EXCLUDED.score,
                algorithm_type = EXCLUDED.algorithm_type,
                reason = EXCLUDED.reason,
                generated_at = EXCLUDED.generated_at
            "#,
        )
        .bind(user_id)
        .bind(&media_ids)
        .bind(&scores)
        .bind(&algorithms)
        .bind(&reasons)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if self.purge_stale {
            let purged = sqlx::query(
                r#"
                DELETE FROM recommendations
                WHERE user_id = $1 AND NOT (media_id = ANY($2))
                "#,
            )
            .bind(user_id)
            .bind(&media_ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if purged > 0 {
                tracing::debug!(user_id = %user_id, purged, "Purged stale recommendations");
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_recommendations(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> AppResult<Vec<Recommendation>> {
        let rows = sqlx::query_as::<_, RecommendationRow>(
            r#"
            SELECT user_id, media_id, score, algorithm_type, reason, generated_at
            FROM recommendations
            WHERE user_id = $1
            ORDER BY score DESC, media_id
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> AppResult<Recommendation> {
                Ok(Recommendation {
                    user_id: row.user_id,
                    media_id: row.media_id,
                    score: row.score,
                    algorithm_type: row.algorithm_type.parse()?,
                    reason: row.reason,
                    generated_at: row.generated_at,
                })
            })
            .collect()
    }
}
