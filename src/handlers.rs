use std::convert::Infallible;
use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use warp::path::FullPath;
use warp::{Rejection, Reply};

use crate::clock::{iso_from_millis, iso_now, now_millis};
use crate::config::{DEFAULT_LAT, DEFAULT_LON};
use crate::errors::{ApiError, QuotaScope, UpstreamError};
use crate::middleware::{add_cors_headers, add_retry_after};
use crate::models::AppState;
use crate::services::{cache_key, enforce_quotas, with_cache, ApiReply, RouteClass};
use crate::upstream::{mock_weather, popular_locations};


#[derive(Debug, Default, Deserialize)]
struct WeatherQuery {
    lat: Option<String>,
    lon: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

pub async fn health(identity: String, state: Arc<AppState>) -> Result<warp::reply::Response, Rejection> {
    let now = now_millis();
    let mut headers = HeaderMap::new();
    if let Err(err) = enforce_quotas(&state, &identity, RouteClass::General, now, &mut headers).await {
        return Ok(error_response(&err, headers));
    }

    let body = json!({
        "status": "OK",
        "message": "Live Weather Dashboard API is running",
        "timestamp": iso_now(),
        "cache": state.cache.stats().await,
        "rateLimit": state.rate_limiter.status(&identity, now).await,
    });
    Ok(json_response(StatusCode::OK, &body, headers))
}

pub async fn weather(
    path: FullPath,
    query: String,
    identity: String,
    state: Arc<AppState>,
) -> Result<warp::reply::Response, Rejection> {
    let mut headers = HeaderMap::new();
    let result = weather_reply(&state, path.as_str(), &query, &identity, &mut headers).await;
    Ok(finish(result, headers))
}

async fn weather_reply(
    state: &AppState,
    path: &str,
    query: &str,
    identity: &str,
    headers: &mut HeaderMap,
) -> Result<ApiReply, ApiError> {
    enforce_quotas(state, identity, RouteClass::WeatherApi, now_millis(), headers).await?;
    let (lat, lon) = parse_coordinates(query)?;

    let key = cache_key(path, query);
    with_cache(&state.cache, &key, state.config.weather_cache_ttl, || async move {
        let data = match state.provider.weather(lat, lon).await {
            Ok(data) => data,
            Err(UpstreamError::MissingCredentials) => {
                info!(lat, lon, "no weather API key configured, serving mock data");
                mock_weather(lat, lon)
            }
            Err(err) => {
                warn!(error = %err, lat, lon, "weather provider failed, serving mock data");
                mock_weather(lat, lon)
            }
        };
        Ok(ApiReply::ok(to_json(&data)?))
    })
    .await
}

pub async fn search_location(
    path: FullPath,
    query: String,
    identity: String,
    state: Arc<AppState>,
) -> Result<warp::reply::Response, Rejection> {
    let mut headers = HeaderMap::new();
    let result = search_reply(&state, path.as_str(), &query, &identity, &mut headers).await;
    Ok(finish(result, headers))
}

async fn search_reply(
    state: &AppState,
    path: &str,
    query: &str,
    identity: &str,
    headers: &mut HeaderMap,
) -> Result<ApiReply, ApiError> {
    enforce_quotas(state, identity, RouteClass::WeatherApi, now_millis(), headers).await?;

    let params: SearchQuery = parse_query(query)?;
    let term = params
        .q
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Query parameter 'q' is required".to_string()))?;

    let key = cache_key(path, query);
    with_cache(&state.cache, &key, state.config.search_cache_ttl, || async move {
        if !state.provider.is_configured() {
            warn!("location search requested without a weather API key");
            return Ok(ApiReply::with_status(
                StatusCode::SERVICE_UNAVAILABLE,
                json!({
                    "error": "Location search unavailable",
                    "message": "Weather API key not configured. Showing popular locations instead.",
                    "suggestions": popular_locations(),
                }),
            ));
        }

        let locations = state.provider.search_locations(&term).await.map_err(|err| {
            error!(error = %err, query = %term, "location search failed");
            ApiError::Upstream(err)
        })?;
        Ok(ApiReply::ok(json!({ "locations": locations })))
    })
    .await
}

fn parse_query<T: for<'de> Deserialize<'de>>(query: &str) -> Result<T, ApiError> {
    serde_urlencoded::from_str(query)
        .map_err(|err| ApiError::BadRequest(format!("Malformed query string: {err}")))
}

/// Reads `lat`/`lon`, defaulting each when absent and rejecting values that
/// are not finite numbers in range.
fn parse_coordinates(query: &str) -> Result<(f64, f64), ApiError> {
    let params: WeatherQuery = parse_query(query)?;
    let lat = parse_coordinate("lat", params.lat.as_deref(), DEFAULT_LAT, 90.0)?;
    let lon = parse_coordinate("lon", params.lon.as_deref(), DEFAULT_LON, 180.0)?;
    Ok((lat, lon))
}

fn parse_coordinate(name: &str, raw: Option<&str>, default: f64, bound: f64) -> Result<f64, ApiError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value.abs() <= bound => Ok(value),
        _ => Err(ApiError::BadRequest(format!(
            "Query parameter '{name}' must be a number between -{bound} and {bound}"
        ))),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|err| ApiError::Internal(err.to_string()))
}

fn finish(result: Result<ApiReply, ApiError>, headers: HeaderMap) -> warp::reply::Response {
    match result {
        Ok(reply) => json_response(reply.status, &reply.body, headers),
        Err(err) => error_response(&err, headers),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T, mut headers: HeaderMap) -> warp::reply::Response {
    let mut response = warp::reply::with_status(warp::reply::json(body), status).into_response();
    add_cors_headers(&mut headers);
    response.headers_mut().extend(headers);
    response
}

fn error_body(err: &ApiError) -> Value {
    match err {
        ApiError::BadRequest(message) => json!({
            "error": "Bad request",
            "message": message,
        }),
        ApiError::QuotaExceeded {
            scope,
            reset_time,
            retry_after,
        } => {
            let (error, message) = match scope {
                QuotaScope::General => (
                    "Too many requests",
                    "Rate limit exceeded. Please try again later.",
                ),
                QuotaScope::WeatherApi => (
                    "Weather API rate limit exceeded",
                    "Too many weather API requests. Please try again later.",
                ),
            };
            json!({
                "error": error,
                "message": message,
                "resetTime": iso_from_millis(*reset_time),
                "retryAfter": retry_after,
            })
        }
        ApiError::Upstream(_) => json!({
            "error": "Failed to search location",
            "message": "The weather provider could not be reached. Please try again later.",
        }),
        ApiError::Internal(_) => json!({
            "error": "Internal server error",
            "message": "Something went wrong",
        }),
    }
}

fn error_response(err: &ApiError, mut headers: HeaderMap) -> warp::reply::Response {
    match err {
        ApiError::QuotaExceeded { retry_after, .. } => add_retry_after(&mut headers, *retry_after),
        ApiError::Internal(detail) => error!(detail = %detail, "request failed"),
        _ => {}
    }
    json_response(err.status(), &error_body(err), headers)
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    if let Some(e) = err.find::<ApiError>() {
        return Ok(error_response(e, HeaderMap::new()));
    }

    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    } else {
        error!(rejection = ?err, "unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    };

    Ok(json_response(code, &json!({ "error": message }), HeaderMap::new()))
}
