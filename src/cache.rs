use std::time::Duration;

use axum::body::Bytes;
use moka::future::Cache;

/// Every product list page is keyed under this prefix so a single predicate
/// can drop them all when a product row changes.
pub const PRODUCT_LIST_PREFIX: &str = "product_list";

/// In-process cache of serialized list responses.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Cache<String, Bytes>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();
        Self { inner }
    }

    /// Cache key for a list endpoint: route path, canonicalized query string
    /// and the Authorization header the response varies on. Authenticated and
    /// anonymous callers never share an entry.
    pub fn list_key(path: &str, query: Option<&str>, authorization: Option<&str>) -> String {
        // Parameter order must not fragment the cache.
        let mut pairs: Vec<&str> = query
            .unwrap_or("")
            .split('&')
            .filter(|p| !p.is_empty())
            .collect();
        pairs.sort_unstable();
        format!(
            "{PRODUCT_LIST_PREFIX}:{path}?{}|auth={}",
            pairs.join("&"),
            authorization.unwrap_or("-"),
        )
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: String, body: Bytes) {
        self.inner.insert(key, body).await;
    }

    /// Drops every cached product list page. Called on any product mutation.
    pub fn invalidate_product_lists(&self) {
        match self
            .inner
            .invalidate_entries_if(|key, _| key.starts_with(PRODUCT_LIST_PREFIX))
        {
            Ok(_) => tracing::debug!("cleared product list cache"),
            Err(err) => tracing::warn!(error = %err, "cache invalidation failed"),
        }
    }
}
