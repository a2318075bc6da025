/// TMDB attribute provider
///
/// Lookups go Redis → TMDB `/movie/{id}?append_to_response=credits,keywords`.
/// Every fetched snapshot is also upserted into `media_attributes`, which is
/// the local catalog the content-based filter scans.
use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{MediaAttributes, MediaId, TmdbMediaDetails},
    services::providers::MediaAttributeProvider,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{header::RETRY_AFTER, Client as HttpClient, StatusCode};
use sqlx::{FromRow, PgPool};
use std::{collections::HashSet, num::NonZeroU32, sync::Arc, time::Duration};

const BASE_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Token bucket shared by every catalog request of the process
pub fn catalog_rate_limiter(
    requests_per_second: u32,
    burst: u32,
) -> AppResult<DefaultDirectRateLimiter> {
    let rate = NonZeroU32::new(requests_per_second).ok_or_else(|| {
        AppError::InvalidConfig("Catalog request rate must be positive".to_string())
    })?;
    let burst = NonZeroU32::new(burst)
        .ok_or_else(|| AppError::InvalidConfig("Catalog burst must be positive".to_string()))?;

    Ok(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)))
}

/// Delay before retry `attempt` (zero-based); a server-provided
/// `Retry-After` wins over exponential backoff. Both are capped.
fn retry_delay(attempt: u32, retry_after: Option<Duration>) -> Duration {
    if let Some(server_delay) = retry_after {
        return server_delay.min(MAX_RETRY_DELAY);
    }
    BASE_RETRY_DELAY
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_RETRY_DELAY)
}

#[derive(FromRow)]
struct MediaAttributesRow {
    media_id: i64,
    genre_ids: Vec<i64>,
    cast_ids: Vec<i64>,
    keyword_ids: Vec<i64>,
}

impl From<MediaAttributesRow> for MediaAttributes {
    fn from(row: MediaAttributesRow) -> Self {
        MediaAttributes {
            media_id: row.media_id,
            genre_ids: row.genre_ids.into_iter().collect(),
            cast_ids: row.cast_ids,
            keyword_ids: row.keyword_ids.into_iter().collect(),
        }
    }
}

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    cache: Cache,
    cache_ttl: u64,
    db_pool: PgPool,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    max_retries: u32,
}

impl TmdbProvider {
    pub fn new(
        cache: Cache,
        db_pool: PgPool,
        api_key: String,
        api_url: String,
        rate_limiter: Arc<DefaultDirectRateLimiter>,
    ) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
            cache_ttl: 2_592_000,
            db_pool,
            rate_limiter,
            max_retries: 3,
        }
    }

    pub fn with_cache_ttl(mut self, cache_ttl: u64) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Fetches attributes from TMDB, retrying rate-limit and server errors
    async fn fetch_attributes(&self, media_id: MediaId) -> AppResult<Option<MediaAttributes>> {
        let url = format!("{}/movie/{}", self.api_url, media_id);
        let mut attempt = 0;

        loop {
            self.rate_limiter.until_ready().await;

            let response = self
                .http_client
                .get(&url)
                .query(&[
                    ("api_key", self.api_key.as_str()),
                    ("append_to_response", "credits,keywords"),
                ])
                .send()
                .await?;

            let status = response.status();

            if status == StatusCode::NOT_FOUND {
                tracing::debug!(media_id, provider = "tmdb", "Title not in catalog");
                return Ok(None);
            }

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if attempt < self.max_retries {
                    let retry_after = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .map(Duration::from_secs);
                    let delay = retry_delay(attempt, retry_after);

                    tracing::warn!(
                        media_id,
                        status = %status,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "TMDB request failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }

                return Err(AppError::ExternalApi(format!(
                    "TMDB returned status {} for media {} after {} attempts",
                    status,
                    media_id,
                    attempt + 1
                )));
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::ExternalApi(format!(
                    "TMDB returned status {}: {}",
                    status, body
                )));
            }

            let details: TmdbMediaDetails = response.json().await?;
            let attributes = MediaAttributes::from(details);

            tracing::debug!(
                media_id,
                genres = attributes.genre_ids.len(),
                cast = attributes.cast_ids.len(),
                keywords = attributes.keyword_ids.len(),
                provider = "tmdb",
                "Attributes fetched"
            );

            return Ok(Some(attributes));
        }
    }

    /// Adds or refreshes a title in the local catalog
    async fn store_attributes(&self, attributes: &MediaAttributes) -> AppResult<()> {
        let genre_ids: Vec<i64> = attributes.genre_ids.iter().copied().collect();
        let keyword_ids: Vec<i64> = attributes.keyword_ids.iter().copied().collect();

        sqlx::query(
            r#"
            INSERT INTO media_attributes (media_id, genre_ids, cast_ids, keyword_ids, fetched_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (media_id) DO UPDATE SET
                genre_ids = EXCLUDED.genre_ids,
                cast_ids = EXCLUDED.cast_ids,
                keyword_ids = EXCLUDED.keyword_ids,
                fetched_at = EXCLUDED.fetched_at
            "#,
        )
        .bind(attributes.media_id)
        .bind(&genre_ids)
        .bind(&attributes.cast_ids)
        .bind(&keyword_ids)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl MediaAttributeProvider for TmdbProvider {
    async fn get_media_attributes(&self, media_id: MediaId) -> AppResult<Option<MediaAttributes>> {
        cached!(
            self.cache,
            CacheKey::MediaAttributes(media_id),
            self.cache_ttl,
            async move {
                let attributes = self.fetch_attributes(media_id).await?;
                if let Some(attributes) = &attributes {
                    self.store_attributes(attributes).await?;
                }
                Ok::<_, AppError>(attributes)
            }
        )
    }

    async fn catalog(&self, limit: usize) -> AppResult<Vec<MediaAttributes>> {
        let rows = sqlx::query_as::<_, MediaAttributesRow>(
            r#"
            SELECT media_id, genre_ids, cast_ids, keyword_ids
            FROM media_attributes
            ORDER BY media_id
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows.into_iter().map(MediaAttributes::from).collect())
    }

    async fn ensure_cataloged(&self, media_ids: &[MediaId]) -> AppResult<usize> {
        let known: HashSet<MediaId> = sqlx::query_scalar::<_, i64>(
            "SELECT media_id FROM media_attributes WHERE media_id = ANY($1)",
        )
        .bind(media_ids)
        .fetch_all(&self.db_pool)
        .await?
        .into_iter()
        .collect();

        let mut added = 0;
        for &media_id in media_ids.iter().filter(|id| !known.contains(id)) {
            // A cache hit skips the fetch, so the row is written here too
            match self.get_media_attributes(media_id).await {
                Ok(Some(attributes)) => {
                    self.store_attributes(&attributes).await?;
                    added += 1;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    media_id,
                    error = %e,
                    "Skipping title during catalog refresh"
                ),
            }
        }

        tracing::info!(
            requested = media_ids.len(),
            already_known = known.len(),
            added,
            "Catalog refreshed"
        );
        Ok(added)
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}
