use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, StatusCode};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::ResponseCache;
use crate::clock::iso_now;
use crate::errors::{ApiError, QuotaScope};
use crate::middleware::{add_quota_headers, GENERAL_PREFIX, WEATHER_PREFIX};
use crate::models::{AppState, QuotaDecision};

#[cfg(test)]
mod tests;

/// Which quotas a route is subject to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Only the general per-client quota.
    General,
    /// The general quota plus the stricter quota for routes that call the provider.
    WeatherApi,
}

/// A JSON body and the status it is sent with.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: StatusCode,
    pub body: Value,
}

impl ApiReply {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    pub fn with_status(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }
}

/// Runs the general quota and, for upstream routes, the weather quota.
/// Headers for every quota that was checked are written to `headers` whether
/// or not the request is admitted.
pub async fn enforce_quotas(
    state: &AppState,
    identity: &str,
    class: RouteClass,
    now: i64,
    headers: &mut HeaderMap,
) -> Result<(), ApiError> {
    let limiter = &state.rate_limiter;

    let general = limiter.check_general(identity, now).await;
    add_quota_headers(headers, GENERAL_PREFIX, limiter.general_limit(), &general);
    if general.limited {
        warn!(client = identity, "rate limit exceeded");
        return Err(quota_exceeded(QuotaScope::General, &general, now));
    }

    if class == RouteClass::WeatherApi {
        let weather = limiter.check_weather_api(identity, now).await;
        add_quota_headers(headers, WEATHER_PREFIX, limiter.weather_api_limit(), &weather);
        if weather.limited {
            warn!(client = identity, "weather API rate limit exceeded");
            return Err(quota_exceeded(QuotaScope::WeatherApi, &weather, now));
        }
        debug!(
            client = identity,
            remaining = weather.remaining,
            "weather API request allowed"
        );
    }

    Ok(())
}

fn quota_exceeded(scope: QuotaScope, decision: &QuotaDecision, now: i64) -> ApiError {
    ApiError::QuotaExceeded {
        scope,
        reset_time: decision.reset_time,
        retry_after: decision.retry_after_secs(now),
    }
}

/// Cache key for a request: the path, the raw query string as received, and
/// the parsed query parameters as JSON. Reordered parameters produce a
/// different key.
pub fn cache_key(path: &str, raw_query: &str) -> String {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw_query).unwrap_or_default();
    let params: Map<String, Value> = pairs
        .into_iter()
        .map(|(name, value)| (name, Value::String(value)))
        .collect();

    let mut key = path.to_string();
    if !raw_query.is_empty() {
        key.push('?');
        key.push_str(raw_query);
    }
    key.push_str(&Value::Object(params).to_string());
    key
}

/// Serves `key` from `cache` when present. Otherwise runs `handler` and stores
/// its body for `ttl` if the status is a success; failures are never cached.
pub async fn with_cache<F, Fut>(
    cache: &ResponseCache,
    key: &str,
    ttl: Duration,
    handler: F,
) -> Result<ApiReply, ApiError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<ApiReply, ApiError>>,
{
    if let Some(cached) = cache.get(key).await {
        debug!(key, "cache hit");
        return Ok(ApiReply::ok(mark_cached(cached, iso_now())));
    }
    debug!(key, "cache miss");

    let reply = handler().await?;
    if reply.status.is_success() {
        cache.set(key, reply.body.clone(), ttl).await;
        debug!(key, ttl_secs = ttl.as_secs(), "cached response");
    }
    Ok(reply)
}

fn mark_cached(mut body: Value, served_at: String) -> Value {
    if let Value::Object(fields) = &mut body {
        fields.insert("cached".to_string(), Value::Bool(true));
        fields.insert("cacheTimestamp".to_string(), Value::String(served_at));
    }
    body
}

/// Starts the periodic cache and rate-limit sweeps. They run until aborted.
pub fn spawn_sweepers(state: Arc<AppState>) -> Vec<JoinHandle<()>> {
    let cache = state.cache.clone();
    let cache_every = state.config.cache_sweep_interval;
    let cache_sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cache_every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.cleanup().await;
            if removed > 0 {
                info!(removed, "cleaned up expired cache entries");
            }
        }
    });

    let limiter = state.rate_limiter.clone();
    let limiter_every = state.config.rate_limit_sweep_interval;
    let limiter_sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(limiter_every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.cleanup().await;
            if removed > 0 {
                info!(removed, "cleaned up idle rate limit entries");
            }
        }
    });

    vec![cache_sweeper, limiter_sweeper]
}
