use std::convert::Infallible;
use std::net::SocketAddr;

use http::header::{HeaderName, HeaderValue, RETRY_AFTER};
use http::HeaderMap;
use warp::Filter;

use crate::clock::iso_from_millis;
use crate::models::QuotaDecision;
use crate::rate_limit::UNKNOWN_CLIENT;

#[cfg(test)]
mod tests;

/// Header prefix for the general per-client quota.
pub const GENERAL_PREFIX: &str = "x-ratelimit";
/// Header prefix for the upstream-calling route quota.
pub const WEATHER_PREFIX: &str = "x-weather-ratelimit";

pub fn add_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        HeaderName::from_static("access-control-allow-origin"),
        HeaderValue::from_static("*"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-methods"),
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(
        HeaderName::from_static("access-control-allow-headers"),
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(
        HeaderName::from_static("access-control-expose-headers"),
        HeaderValue::from_static(
            "X-RateLimit-Limit, X-RateLimit-Remaining, X-RateLimit-Reset, \
             X-Weather-RateLimit-Limit, X-Weather-RateLimit-Remaining, X-Weather-RateLimit-Reset, \
             Retry-After",
        ),
    );
}

/// Writes `<prefix>-limit`, `<prefix>-remaining` and `<prefix>-reset` for one quota.
pub fn add_quota_headers(headers: &mut HeaderMap, prefix: &str, limit: u32, decision: &QuotaDecision) {
    let reset = iso_from_millis(decision.reset_time);
    let pairs = [
        ("limit", limit.to_string()),
        ("remaining", decision.remaining.to_string()),
        ("reset", reset),
    ];
    for (suffix, value) in pairs {
        let name = HeaderName::from_bytes(format!("{prefix}-{suffix}").as_bytes());
        let value = HeaderValue::from_str(&value);
        if let (Ok(name), Ok(value)) = (name, value) {
            headers.insert(name, value);
        }
    }
}

pub fn add_retry_after(headers: &mut HeaderMap, seconds: i64) {
    headers.insert(RETRY_AFTER, HeaderValue::from(seconds));
}

/// Client identity for rate limiting: the peer address, else [`UNKNOWN_CLIENT`].
/// With `trust_forwarded_for` set, the first `X-Forwarded-For` hop wins over both.
pub fn resolve_identity(
    forwarded_for: Option<&str>,
    remote: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> String {
    forwarded_for
        .filter(|_| trust_forwarded_for)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_string)
        .or_else(|| remote.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

pub fn client_identity(
    trust_forwarded_for: bool,
) -> impl Filter<Extract = (String,), Error = Infallible> + Clone {
    warp::header::optional::<String>("x-forwarded-for")
        .or_else(|_| async { Ok::<(Option<String>,), Infallible>((None,)) })
        .and(warp::addr::remote())
        .map(move |forwarded: Option<String>, remote: Option<SocketAddr>| {
            resolve_identity(forwarded.as_deref(), remote, trust_forwarded_for)
        })
}
