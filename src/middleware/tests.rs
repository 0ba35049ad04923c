use std::net::SocketAddr;

use http::HeaderMap;

use crate::middleware::{
    add_cors_headers, add_quota_headers, add_retry_after, resolve_identity, GENERAL_PREFIX,
    WEATHER_PREFIX,
};
use crate::models::QuotaDecision;

#[test]
fn test_add_cors_headers() {
    let mut headers = HeaderMap::new();
    add_cors_headers(&mut headers);

    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(
        headers.get("access-control-allow-methods").unwrap(),
        "GET, OPTIONS"
    );
    assert!(headers
        .get("access-control-expose-headers")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("X-Weather-RateLimit-Remaining"));
}

#[test]
fn test_add_quota_headers() {
    let mut headers = HeaderMap::new();
    let decision = QuotaDecision {
        limited: false,
        remaining: 7,
        reset_time: 60_000,
    };
    add_quota_headers(&mut headers, GENERAL_PREFIX, 10, &decision);
    add_quota_headers(&mut headers, WEATHER_PREFIX, 3, &decision);

    assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "10");
    assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "7");
    assert_eq!(
        headers.get("x-ratelimit-reset").unwrap(),
        "1970-01-01T00:01:00.000Z"
    );
    assert_eq!(headers.get("x-weather-ratelimit-limit").unwrap(), "3");
}

#[test]
fn test_add_retry_after() {
    let mut headers = HeaderMap::new();
    add_retry_after(&mut headers, 42);
    assert_eq!(headers.get("retry-after").unwrap(), "42");
}

#[test]
fn test_resolve_identity_uses_peer_by_default() {
    let peer: SocketAddr = "10.0.0.7:5555".parse().unwrap();

    assert_eq!(resolve_identity(Some("203.0.113.9"), Some(peer), false), "10.0.0.7");
    assert_eq!(resolve_identity(None, Some(peer), false), "10.0.0.7");
    assert_eq!(resolve_identity(Some("203.0.113.9"), None, false), "unknown");
    assert_eq!(resolve_identity(None, None, false), "unknown");
}

#[test]
fn test_resolve_identity_with_trusted_forwarded_for() {
    let peer: SocketAddr = "10.0.0.7:5555".parse().unwrap();

    assert_eq!(
        resolve_identity(Some("203.0.113.9, 10.0.0.1"), Some(peer), true),
        "203.0.113.9"
    );
    assert_eq!(resolve_identity(None, Some(peer), true), "10.0.0.7");
    assert_eq!(resolve_identity(Some("  "), Some(peer), true), "10.0.0.7");
    assert_eq!(resolve_identity(None, None, true), "unknown");
}
