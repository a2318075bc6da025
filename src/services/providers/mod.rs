/// Media attribute provider abstraction
///
/// Attribute data comes from an external catalog service and changes
/// rarely, so implementations are expected to cache aggressively and to
/// respect the provider's request-rate caps.
use crate::{
    error::AppResult,
    models::{MediaAttributes, MediaId},
};

pub mod tmdb;

pub use tmdb::TmdbProvider;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MediaAttributeProvider: Send + Sync {
    /// Genre, cast and keyword ids for one title
    ///
    /// `Ok(None)` when the catalog does not know the title. Errors are
    /// reserved for failed lookups.
    async fn get_media_attributes(&self, media_id: MediaId) -> AppResult<Option<MediaAttributes>>;

    /// First `limit` titles of the local catalog, in a stable order
    async fn catalog(&self, limit: usize) -> AppResult<Vec<MediaAttributes>>;

    /// Adds the titles in `media_ids` that the local catalog lacks
    ///
    /// Best effort: a title whose lookup fails is skipped. Returns how many
    /// titles were added.
    async fn ensure_cataloged(&self, media_ids: &[MediaId]) -> AppResult<usize>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
