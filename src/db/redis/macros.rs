/// Read-through caching against Redis.
///
/// Returns the cached value when `$key` is present. Otherwise awaits
/// `$block`, queues the result for a background write with `$ttl` seconds
/// to live, and returns it. A failed cache read is logged and treated as a
/// miss.
///
/// `$cache` must expose `get_from_cache` and `set_in_background`, and the
/// surrounding function must return `AppResult`.
///
/// # Example
/// ```rust,ignore
/// let attributes: Option<MediaAttributes> = cached!(
///     self.cache,
///     CacheKey::MediaAttributes(media_id),
///     ttl,
///     async move { self.fetch_details(media_id).await }
/// )?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let key = $key;
        match $cache.get_from_cache(&key).await {
            Ok(Some(cached)) => Ok(cached),
            lookup => {
                if let Err(e) = lookup {
                    tracing::warn!(key = %key, error = %e, "Cache read failed, using source");
                }
                let value = $block.await?;
                $cache.set_in_background(&key, &value, $ttl);
                Ok(value)
            }
        }
    }};
}
