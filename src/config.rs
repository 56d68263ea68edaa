use std::env;
use std::time::Duration;

use crate::throttle::{Rate, ThrottleConfig};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub cache_ttl: Duration,
    pub throttle: ThrottleConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let cache_ttl = env::var("CACHE_TTL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(15 * 60));
        let throttle = ThrottleConfig {
            burst: rate_from_env("THROTTLE_BURST", Rate::per_minute(30)),
            sustained: rate_from_env("THROTTLE_SUSTAINED", Rate::new(500, 3600)),
            get: rate_from_env("THROTTLE_GET", Rate::per_minute(60)),
            post: rate_from_env("THROTTLE_POST", Rate::per_minute(20)),
        };
        Ok(Self {
            port,
            database_url,
            host,
            cache_ttl,
            throttle,
        })
    }
}

// Rates are given as "count/window_secs", e.g. "30/60".
fn rate_from_env(key: &str, default: Rate) -> Rate {
    match env::var(key) {
        Ok(raw) => match raw.parse::<Rate>() {
            Ok(rate) => rate,
            Err(err) => {
                tracing::warn!(%key, %raw, error = %err, "invalid throttle rate, using default");
                default
            }
        },
        Err(_) => default,
    }
}
