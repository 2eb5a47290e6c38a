//! Fixed-window rate limiting for API requests.
//!
//! The limiter is constructed once at startup and injected into the
//! middleware through shared state, so every request observes the same
//! counters. Backends: an in-process [`DashMap`] store, or Redis for
//! multi-instance deployments (with an in-memory fallback when Redis is
//! unreachable).

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Numeric strings are always valid ASCII header values.
fn num_to_header_value<T: ToString>(n: T) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded")]
    LimitExceeded,
    #[error("Internal error: {0}")]
    InternalError(String),
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
    last_request: Instant,
}

impl RateLimitEntry {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            count: 1,
            window_start: now,
            last_request: now,
        }
    }

    fn increment(&mut self, window_duration: Duration) {
        let now = Instant::now();

        // Reset if window has expired
        if now.duration_since(self.window_start) >= window_duration {
            self.count = 1;
            self.window_start = now;
        } else {
            self.count += 1;
        }

        self.last_request = now;
    }

    fn time_until_reset(&self, window_duration: Duration) -> Duration {
        let elapsed = self.last_request.duration_since(self.window_start);
        if elapsed >= window_duration {
            Duration::from_secs(0)
        } else {
            window_duration - elapsed
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
    pub enable_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_duration: Duration::from_secs(60),
            enable_headers: true,
        }
    }
}

#[derive(Clone)]
pub enum RateLimitBackend {
    InMemory,
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
    },
}

impl Default for RateLimitBackend {
    fn default() -> Self {
        Self::InMemory
    }
}

#[derive(Clone)]
enum RateLimitStore {
    InMemory {
        entries: Arc<DashMap<String, RateLimitEntry>>,
    },
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
        fallback: Arc<DashMap<String, RateLimitEntry>>,
    },
}

#[derive(Clone)]
pub struct RateLimiter {
    store: RateLimitStore,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, backend: RateLimitBackend) -> Self {
        let store = match backend {
            RateLimitBackend::InMemory => RateLimitStore::InMemory {
                entries: Arc::new(DashMap::new()),
            },
            RateLimitBackend::Redis { client, namespace } => RateLimitStore::Redis {
                client,
                namespace,
                fallback: Arc::new(DashMap::new()),
            },
        };

        Self { store, config }
    }

    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(config, RateLimitBackend::InMemory)
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub async fn check_rate_limit(&self, key: &str) -> Result<RateLimitResult, RateLimitError> {
        match &self.store {
            RateLimitStore::InMemory { entries } => {
                Ok(Self::check_in_memory(entries, key, &self.config))
            }
            RateLimitStore::Redis {
                client,
                namespace,
                fallback,
            } => match client.get_async_connection().await {
                Ok(mut conn) => {
                    match Self::check_with_redis(&mut conn, namespace, key, &self.config).await {
                        Ok(result) => Ok(result),
                        Err(err) => {
                            warn!("Redis rate limit error: {}", err);
                            Ok(Self::check_in_memory(fallback, key, &self.config))
                        }
                    }
                }
                Err(err) => {
                    warn!(
                        "Failed to connect to Redis for rate limiting, using fallback: {}",
                        err
                    );
                    Ok(Self::check_in_memory(fallback, key, &self.config))
                }
            },
        }
    }

    fn check_in_memory(
        entries: &DashMap<String, RateLimitEntry>,
        key: &str,
        config: &RateLimitConfig,
    ) -> RateLimitResult {
        // A fresh entry already counts the current request; only existing
        // entries get incremented, so the first request is counted once.
        let entry = match entries.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                let mut entry = occupied.into_ref();
                entry.increment(config.window_duration);
                entry
            }
            Entry::Vacant(vacant) => vacant.insert(RateLimitEntry::new()),
        };

        let allowed = entry.count <= config.requests_per_window;
        let remaining = if allowed {
            config.requests_per_window.saturating_sub(entry.count)
        } else {
            0
        };
        let time_until_reset = entry.time_until_reset(config.window_duration);

        RateLimitResult {
            allowed,
            limit: config.requests_per_window,
            remaining,
            reset_time: time_until_reset,
        }
    }

    async fn check_with_redis<C>(
        conn: &mut C,
        namespace: &str,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, redis::RedisError>
    where
        C: redis::aio::ConnectionLike + Send,
    {
        let redis_key = format!("{}:{}", namespace, key);
        let limit = config.requests_per_window as i64;
        let window_secs = config.window_duration.as_secs().max(1);

        let count: i64 = conn.incr(&redis_key, 1).await?;
        if count == 1 {
            let _: Result<(), _> = conn.expire(&redis_key, window_secs as usize).await;
        } else {
            let ttl: i64 = conn.ttl(&redis_key).await.unwrap_or(-1);
            if ttl < 0 {
                let _: Result<(), _> = conn.expire(&redis_key, window_secs as usize).await;
            }
        }

        let ttl_secs = match conn.ttl::<_, i64>(&redis_key).await {
            Ok(ttl) if ttl > 0 => ttl as u64,
            _ => window_secs,
        };
        let allowed = count <= limit;
        let remaining = if allowed {
            config
                .requests_per_window
                .saturating_sub(count.max(0) as u32)
        } else {
            0
        };

        Ok(RateLimitResult {
            allowed,
            limit: config.requests_per_window,
            remaining,
            reset_time: Duration::from_secs(ttl_secs),
        })
    }

    pub async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        match &self.store {
            RateLimitStore::InMemory { entries } => {
                entries.remove(key);
            }
            RateLimitStore::Redis {
                client,
                namespace,
                fallback,
            } => {
                let redis_key = format!("{}:{}", namespace, key);
                match client.get_async_connection().await {
                    Ok(mut conn) => {
                        let _: Result<(), _> = conn.del(&redis_key).await;
                    }
                    Err(err) => {
                        warn!("Failed to reset Redis quota for {}: {}", key, err);
                    }
                }
                fallback.remove(key);
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: Duration,
}

/// Extracts the limiter key for a request: user id from a validated bearer
/// token when present, else client IP.
fn extract_key(request: &Request, jwt_secret: &str) -> String {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(raw) = auth_header.to_str() {
            if let Some(token) = raw.strip_prefix("Bearer ").map(str::trim) {
                if let Ok(claims) = crate::auth::validate_token(jwt_secret, token) {
                    return format!("user:{}", claims.sub);
                }
            }
        }
    }

    // Real IP from proxy headers when behind a load balancer
    if let Some(forwarded) = request.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(ip) = forwarded_str.split(',').next() {
                return format!("ip:{}", ip.trim());
            }
        }
    }

    if let Some(real_ip) = request.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return format!("ip:{}", ip_str);
        }
    }

    "ip:unknown".to_string()
}

/// Shared state handed to [`rate_limit_middleware`] via
/// `middleware::from_fn_with_state`.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,
    pub jwt_secret: String,
}

/// Middleware enforcing the injected limiter. Responds 429 with
/// `X-RateLimit-*` headers when the window is exhausted.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let key = extract_key(&request, &state.jwt_secret);
    let enable_headers = state.limiter.config().enable_headers;

    let result = match state.limiter.check_rate_limit(&key).await {
        Ok(result) => result,
        Err(err) => {
            // Limiter backend failure never blocks traffic.
            warn!("Rate limiter error for key {}: {}", key, err);
            return next.run(request).await;
        }
    };

    if !result.allowed {
        warn!("Rate limit exceeded for key: {}", key);

        let mut response = Response::new(axum::body::Body::from("Rate limit exceeded"));
        *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;

        if enable_headers {
            let headers = response.headers_mut();
            headers.insert("X-RateLimit-Limit", num_to_header_value(result.limit));
            headers.insert("X-RateLimit-Remaining", num_to_header_value(0));
            headers.insert(
                "X-RateLimit-Reset",
                num_to_header_value(result.reset_time.as_secs()),
            );
        }

        return response;
    }

    let mut response = next.run(request).await;

    if enable_headers {
        let headers = response.headers_mut();
        headers.insert("X-RateLimit-Limit", num_to_header_value(result.limit));
        headers.insert(
            "X-RateLimit-Remaining",
            num_to_header_value(result.remaining),
        );
        headers.insert(
            "X-RateLimit-Reset",
            num_to_header_value(result.reset_time.as_secs()),
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> RateLimitConfig {
        RateLimitConfig {
            requests_per_window: 3,
            window_duration: Duration::from_secs(60),
            enable_headers: true,
        }
    }

    #[tokio::test]
    async fn allows_up_to_limit_then_blocks() {
        let limiter = RateLimiter::in_memory(small_config());

        for _ in 0..3 {
            let result = limiter.check_rate_limit("user:abc").await.expect("check");
            assert!(result.allowed);
        }

        let result = limiter.check_rate_limit("user:abc").await.expect("check");
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
    }

    #[tokio::test]
    async fn first_request_is_counted_once() {
        let limiter = RateLimiter::in_memory(small_config());

        let result = limiter.check_rate_limit("user:fresh").await.expect("check");
        assert!(result.allowed);
        assert_eq!(result.remaining, 2);
    }

    #[tokio::test]
    async fn keys_are_tracked_independently() {
        let limiter = RateLimiter::in_memory(small_config());

        for _ in 0..3 {
            limiter.check_rate_limit("user:a").await.expect("check");
        }

        let result = limiter.check_rate_limit("user:b").await.expect("check");
        assert!(result.allowed);
        assert_eq!(result.remaining, 2);
    }

    #[tokio::test]
    async fn reset_clears_the_window() {
        let limiter = RateLimiter::in_memory(small_config());

        for _ in 0..4 {
            let _ = limiter.check_rate_limit("user:abc").await;
        }
        assert!(!limiter.check_rate_limit("user:abc").await.unwrap().allowed);

        limiter.reset("user:abc").await.expect("reset");
        assert!(limiter.check_rate_limit("user:abc").await.unwrap().allowed);
    }
}
