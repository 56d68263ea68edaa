use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::RwLock;

use crate::{
    error::AppError,
    middleware::auth::{bearer_token, decode_claims},
    state::AppState,
};

/// A request budget: at most `limit` requests per sliding `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub limit: usize,
    pub window: Duration,
}

impl Rate {
    pub fn new(limit: usize, window_secs: u64) -> Self {
        Self {
            limit,
            window: Duration::from_secs(window_secs),
        }
    }

    pub fn per_minute(limit: usize) -> Self {
        Self::new(limit, 60)
    }
}

impl FromStr for Rate {
    type Err = String;

    /// Parses "count/window_secs", e.g. "30/60".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (limit, window) = s
            .split_once('/')
            .ok_or_else(|| format!("expected count/secs, got {s:?}"))?;
        let limit: usize = limit
            .trim()
            .parse()
            .map_err(|_| format!("invalid count in {s:?}"))?;
        let window: u64 = window
            .trim()
            .parse()
            .map_err(|_| format!("invalid window in {s:?}"))?;
        if limit == 0 || window == 0 {
            return Err(format!("count and window must be positive in {s:?}"));
        }
        Ok(Rate::new(limit, window))
    }
}

/// Named rate-limit buckets. `Burst` and `Sustained` count every request,
/// `Get` and `Post` only requests of the matching method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Burst,
    Sustained,
    Get,
    Post,
}

impl Scope {
    const ALL: [Scope; 4] = [Scope::Burst, Scope::Sustained, Scope::Get, Scope::Post];

    fn applies_to(self, method: &Method) -> bool {
        match self {
            Scope::Burst | Scope::Sustained => true,
            Scope::Get => method == Method::GET,
            Scope::Post => method == Method::POST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    pub burst: Rate,
    pub sustained: Rate,
    pub get: Rate,
    pub post: Rate,
}

impl ThrottleConfig {
    fn rate(&self, scope: Scope) -> Rate {
        match scope {
            Scope::Burst => self.burst,
            Scope::Sustained => self.sustained,
            Scope::Get => self.get,
            Scope::Post => self.post,
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            burst: Rate::per_minute(30),
            sustained: Rate::new(500, 3600),
            get: Rate::per_minute(60),
            post: Rate::per_minute(20),
        }
    }
}

/// Sliding-window throttles keyed by (scope, caller). A request is admitted
/// only when every scope that applies to its method has budget left.
#[derive(Clone)]
pub struct Throttles {
    config: ThrottleConfig,
    history: Arc<RwLock<HashMap<(Scope, String), Vec<Instant>>>>,
}

impl Throttles {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            history: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns `Err(retry_after_secs)` when the request must be rejected.
    pub async fn check(&self, caller: &str, method: &Method) -> Result<(), u64> {
        self.check_at(caller, method, Instant::now()).await
    }

    pub async fn check_at(&self, caller: &str, method: &Method, now: Instant) -> Result<(), u64> {
        for scope in Scope::ALL {
            if scope.applies_to(method) {
                self.admit(scope, caller, now).await?;
            }
        }
        Ok(())
    }

    async fn admit(&self, scope: Scope, caller: &str, now: Instant) -> Result<(), u64> {
        let rate = self.config.rate(scope);
        let mut history = self.history.write().await;

        let timestamps = history.entry((scope, caller.to_string())).or_default();
        timestamps.retain(|t| now.duration_since(*t) < rate.window);

        if timestamps.len() >= rate.limit {
            // Timestamps stay ordered, so the first one leaves the window first.
            let oldest = timestamps[0];
            let wait = rate.window.saturating_sub(now.duration_since(oldest));
            return Err(wait.as_secs().max(1));
        }
        timestamps.push(now);

        // Keep per-caller state from growing without bound: once the map is
        // large, drop every bucket whose requests have all left their window.
        if history.len() > 4096 {
            let config = &self.config;
            history.retain(|(scope, _), timestamps| {
                let window = config.rate(*scope).window;
                timestamps.retain(|t| now.duration_since(*t) < window);
                !timestamps.is_empty()
            });
        }
        Ok(())
    }

    /// Number of (scope, caller) buckets currently tracked.
    pub async fn tracked_buckets(&self) -> usize {
        self.history.read().await.len()
    }
}

pub async fn throttle_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let caller = caller_key(request.headers(), peer);
    match state.throttles.check(&caller, request.method()).await {
        Ok(()) => next.run(request).await,
        Err(retry_after_secs) => {
            tracing::debug!(
                %caller,
                method = %request.method(),
                retry_after_secs,
                "request throttled"
            );
            AppError::TooManyRequests { retry_after_secs }.into_response()
        }
    }
}

/// Authenticated callers share a bucket per user id; anonymous ones are keyed
/// by the forwarded client address, then the peer address.
pub fn caller_key(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    if let Some(token) = bearer_token(headers)
        && let Ok(claims) = decode_claims(token)
    {
        return format!("user:{}", claims.sub);
    }

    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return format!("ip:{ip}");
    }

    match peer {
        Some(addr) => format!("ip:{addr}"),
        None => "anon".to_string(),
    }
}
