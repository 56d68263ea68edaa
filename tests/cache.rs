use std::time::Duration;

use axum::body::Bytes;
use storefront_api::cache::ResponseCache;

#[test]
fn list_key_varies_on_query_and_authorization() {
    let anon = ResponseCache::list_key("/api/products", Some("limit=5"), None);
    let other_query = ResponseCache::list_key("/api/products", Some("limit=10"), None);
    let authed = ResponseCache::list_key("/api/products", Some("limit=5"), Some("Bearer abc"));

    assert_ne!(anon, other_query);
    assert_ne!(anon, authed);
    assert_eq!(
        anon,
        ResponseCache::list_key("/api/products", Some("limit=5"), None)
    );
}

#[test]
fn list_key_is_stable_across_parameter_order() {
    let a = ResponseCache::list_key("/api/products", Some("limit=10&offset=0"), None);
    let b = ResponseCache::list_key("/api/products", Some("offset=0&limit=10"), None);
    assert_eq!(a, b);
}

#[tokio::test]
async fn stores_and_returns_entries_until_invalidated() {
    let cache = ResponseCache::new(Duration::from_secs(60));
    let key = ResponseCache::list_key("/api/products", None, None);

    assert!(cache.get(&key).await.is_none());

    cache.insert(key.clone(), Bytes::from_static(b"{}")).await;
    assert_eq!(cache.get(&key).await, Some(Bytes::from_static(b"{}")));

    // A product mutation drops every product list entry.
    cache.invalidate_product_lists();
    assert!(cache.get(&key).await.is_none());
}

#[tokio::test]
async fn entries_expire_after_ttl() {
    let cache = ResponseCache::new(Duration::from_millis(50));
    let key = ResponseCache::list_key("/api/products", Some("in_stock=true"), None);

    cache.insert(key.clone(), Bytes::from_static(b"{}")).await;
    assert!(cache.get(&key).await.is_some());

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(cache.get(&key).await.is_none());
}
