pub mod postgres;
pub mod redis;
pub mod store;

pub use postgres::{create_pool, run_migrations, PgStore};
pub use redis::create_redis_client;
pub use redis::{Cache, CacheKey, CacheWriterHandle};
pub use store::{RatingStore, RecommendationStore};
