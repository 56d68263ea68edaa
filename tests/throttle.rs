use std::net::IpAddr;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, Method};
use storefront_api::throttle::{Rate, ThrottleConfig, Throttles, caller_key};

fn generous() -> Rate {
    Rate::new(10_000, 3600)
}

#[test]
fn rate_parses_count_slash_seconds() {
    let rate: Rate = "30/60".parse().expect("valid rate");
    assert_eq!(rate, Rate::per_minute(30));

    assert!("30".parse::<Rate>().is_err());
    assert!("x/60".parse::<Rate>().is_err());
    assert!("30/0".parse::<Rate>().is_err());
    assert!("0/60".parse::<Rate>().is_err());
}

#[tokio::test]
async fn burst_scope_rejects_over_limit_with_retry_after() {
    let throttles = Throttles::new(ThrottleConfig {
        burst: Rate::per_minute(2),
        sustained: generous(),
        get: generous(),
        post: generous(),
    });

    assert!(throttles.check("user:a", &Method::GET).await.is_ok());
    assert!(throttles.check("user:a", &Method::GET).await.is_ok());

    let retry = throttles
        .check("user:a", &Method::GET)
        .await
        .expect_err("third request within the window must be rejected");
    assert!(retry >= 1 && retry <= 60, "retry-after {retry} out of range");
}

#[tokio::test]
async fn get_scope_ignores_other_methods() {
    let throttles = Throttles::new(ThrottleConfig {
        burst: generous(),
        sustained: generous(),
        get: Rate::per_minute(1),
        post: generous(),
    });

    // POSTs never consume GET budget.
    assert!(throttles.check("user:a", &Method::POST).await.is_ok());
    assert!(throttles.check("user:a", &Method::POST).await.is_ok());

    assert!(throttles.check("user:a", &Method::GET).await.is_ok());
    assert!(throttles.check("user:a", &Method::GET).await.is_err());

    // DELETE only hits the burst/sustained scopes.
    assert!(throttles.check("user:a", &Method::DELETE).await.is_ok());
}

#[tokio::test]
async fn post_scope_limits_posts_only() {
    let throttles = Throttles::new(ThrottleConfig {
        burst: generous(),
        sustained: generous(),
        get: generous(),
        post: Rate::per_minute(1),
    });

    assert!(throttles.check("user:a", &Method::POST).await.is_ok());
    assert!(throttles.check("user:a", &Method::POST).await.is_err());
    assert!(throttles.check("user:a", &Method::GET).await.is_ok());
}

#[tokio::test]
async fn stale_caller_state_is_swept_once_windows_roll_over() {
    let one_per_second = Rate::new(1, 1);
    let throttles = Throttles::new(ThrottleConfig {
        burst: one_per_second,
        sustained: one_per_second,
        get: one_per_second,
        post: one_per_second,
    });

    let t0 = Instant::now();
    for i in 0..10 {
        let caller = format!("ip:10.0.0.{i}");
        assert!(throttles.check_at(&caller, &Method::GET, t0).await.is_ok());
    }
    // A GET touches the burst, sustained and get scopes.
    assert_eq!(throttles.tracked_buckets().await, 30);

    // Enough fresh callers to cross the sweep threshold after the stale
    // windows have rolled over; the stale buckets must be gone afterwards.
    let later = t0 + Duration::from_secs(2);
    for i in 0..1400 {
        let caller = format!("user:{i}");
        assert!(
            throttles
                .check_at(&caller, &Method::GET, later)
                .await
                .is_ok()
        );
    }
    assert_eq!(throttles.tracked_buckets().await, 1400 * 3);
}

#[test]
fn caller_key_prefers_forwarded_header_then_peer_address() {
    let peer = Some(IpAddr::from([192, 0, 2, 1]));

    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
    assert_eq!(caller_key(&headers, peer), "ip:203.0.113.9");

    // Anonymous callers without the header get their own peer-address bucket.
    let headers = HeaderMap::new();
    assert_eq!(caller_key(&headers, peer), "ip:192.0.2.1");
    assert_eq!(caller_key(&headers, None), "anon");
}

#[tokio::test]
async fn callers_get_independent_buckets() {
    let throttles = Throttles::new(ThrottleConfig {
        burst: Rate::per_minute(1),
        sustained: generous(),
        get: generous(),
        post: generous(),
    });

    assert!(throttles.check("user:a", &Method::GET).await.is_ok());
    assert!(throttles.check("user:a", &Method::GET).await.is_err());
    assert!(throttles.check("user:b", &Method::GET).await.is_ok());
    assert!(throttles.check("ip:10.0.0.1", &Method::GET).await.is_ok());
}
