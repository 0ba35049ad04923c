use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use serde_json::json;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::errors::{ApiError, QuotaScope, UpstreamError};
use crate::models::{AppState, LocationResult, WeatherData};
use crate::services::{cache_key, enforce_quotas, spawn_sweepers, with_cache, ApiReply, RouteClass};
use crate::upstream::{mock_weather, WeatherProvider};

struct NoProvider;

#[async_trait]
impl WeatherProvider for NoProvider {
    fn is_configured(&self) -> bool {
        false
    }

    async fn weather(&self, _lat: f64, _lon: f64) -> Result<WeatherData, UpstreamError> {
        Err(UpstreamError::MissingCredentials)
    }

    async fn search_locations(&self, _query: &str) -> Result<Vec<LocationResult>, UpstreamError> {
        Err(UpstreamError::MissingCredentials)
    }
}

fn state_with_limits(general: u32, weather: u32) -> AppState {
    let config = Config {
        general_limit: general,
        weather_api_limit: weather,
        ..Config::default()
    };
    AppState::new(config, Arc::new(NoProvider))
}

#[test]
fn test_cache_key_includes_path_and_query() {
    assert_eq!(cache_key("/api/health", ""), "/api/health{}");
    assert_eq!(
        cache_key("/api/weather", "lat=1&lon=2"),
        r#"/api/weather?lat=1&lon=2{"lat":"1","lon":"2"}"#
    );
}

#[test]
fn test_cache_key_is_order_sensitive() {
    assert_ne!(
        cache_key("/api/weather", "lat=1&lon=2"),
        cache_key("/api/weather", "lon=2&lat=1")
    );
    assert_eq!(
        cache_key("/api/weather", "lat=1&lon=2"),
        cache_key("/api/weather", "lat=1&lon=2")
    );
}

#[tokio::test]
async fn test_with_cache_marks_hits() {
    let cache = ResponseCache::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let first = with_cache(&cache, "k", Duration::from_secs(60), move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(ApiReply::ok(json!({"temperature": 20})))
    })
    .await
    .unwrap();
    assert_eq!(first.body, json!({"temperature": 20}));

    let counter = calls.clone();
    let second = with_cache(&cache, "k", Duration::from_secs(60), move || async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(ApiReply::ok(json!({})))
    })
    .await
    .unwrap();
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["temperature"], 20);
    assert_eq!(second.body["cached"], true);
    assert!(second.body["cacheTimestamp"].is_string());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // The stored entry itself is not modified by serving a hit.
    assert_eq!(cache.get("k").await, Some(json!({"temperature": 20})));
}

#[tokio::test]
async fn test_with_cache_skips_unsuccessful_replies() {
    let cache = ResponseCache::new();

    let reply = with_cache(&cache, "k", Duration::from_secs(60), || async {
        Ok(ApiReply::with_status(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"error": "unavailable"}),
        ))
    })
    .await
    .unwrap();
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);

    let failed = with_cache(&cache, "k", Duration::from_secs(60), || async {
        Err(ApiError::Internal("boom".to_string()))
    })
    .await;
    assert!(failed.is_err());
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_enforce_quotas_general_route_sets_only_general_headers() {
    let state = state_with_limits(2, 1);
    let mut headers = HeaderMap::new();

    enforce_quotas(&state, "ip", RouteClass::General, 0, &mut headers)
        .await
        .unwrap();
    assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "1");
    assert!(headers.get("x-weather-ratelimit-remaining").is_none());
}

#[tokio::test]
async fn test_enforce_quotas_requires_both_quotas() {
    let state = state_with_limits(10, 1);

    let mut headers = HeaderMap::new();
    enforce_quotas(&state, "ip", RouteClass::WeatherApi, 0, &mut headers)
        .await
        .unwrap();
    assert_eq!(headers.get("x-weather-ratelimit-remaining").unwrap(), "0");

    let mut headers = HeaderMap::new();
    let err = enforce_quotas(&state, "ip", RouteClass::WeatherApi, 1_000, &mut headers)
        .await
        .unwrap_err();
    match err {
        ApiError::QuotaExceeded {
            scope,
            reset_time,
            retry_after,
        } => {
            assert_eq!(scope, QuotaScope::WeatherApi);
            assert_eq!(reset_time, 60_000);
            assert_eq!(retry_after, 59);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // General quota passed and reported its own headers.
    assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "8");
    assert_eq!(headers.get("x-weather-ratelimit-remaining").unwrap(), "0");
}

#[tokio::test]
async fn test_enforce_quotas_general_rejection_skips_weather_check() {
    let state = state_with_limits(1, 5);
    let mut headers = HeaderMap::new();
    enforce_quotas(&state, "ip", RouteClass::WeatherApi, 0, &mut headers)
        .await
        .unwrap();

    let mut headers = HeaderMap::new();
    let err = enforce_quotas(&state, "ip", RouteClass::WeatherApi, 10, &mut headers)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ApiError::QuotaExceeded {
            scope: QuotaScope::General,
            ..
        }
    ));
    assert!(headers.get("x-weather-ratelimit-remaining").is_none());
    assert_eq!(
        state.rate_limiter.status("ip", 10).await.weather_api.remaining,
        4
    );
}

#[tokio::test]
async fn test_sweepers_reclaim_expired_state() {
    let config = Config {
        cache_sweep_interval: Duration::from_millis(20),
        rate_limit_sweep_interval: Duration::from_millis(20),
        ..Config::default()
    };
    let state = Arc::new(AppState::new(config, Arc::new(NoProvider)));
    let value = serde_json::to_value(mock_weather(0.0, 0.0)).unwrap();
    state.cache.set_at("stale", value, Duration::from_millis(1), 0).await;
    state.rate_limiter.check_general("ip", 0).await;

    let handles = spawn_sweepers(state.clone());
    for _ in 0..200 {
        if state.cache.is_empty().await && state.rate_limiter.tracked_identities().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    for handle in handles {
        handle.abort();
    }

    assert!(state.cache.is_empty().await);
    assert_eq!(state.rate_limiter.tracked_identities().await, 0);
}
