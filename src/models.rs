use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::rate_limit::RateLimiter;
use crate::upstream::WeatherProvider;

pub struct CacheEntry {
    pub value: Value,
    pub expires_at: i64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_items: usize,
    pub valid_items: usize,
    pub expired_items: usize,
}

/// Outcome of a single quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaDecision {
    pub limited: bool,
    pub remaining: u32,
    /// Epoch milliseconds at which another request will be admitted.
    pub reset_time: i64,
}

impl QuotaDecision {
    /// Whole seconds until `reset_time`, rounded up.
    pub fn retry_after_secs(&self, now: i64) -> i64 {
        let wait = self.reset_time.saturating_sub(now);
        if wait <= 0 {
            0
        } else {
            wait.saturating_add(999) / 1000
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    pub remaining: u32,
    pub reset_time: i64,
    pub limited: bool,
}

impl From<QuotaDecision> for QuotaSnapshot {
    fn from(decision: QuotaDecision) -> Self {
        Self {
            remaining: decision.remaining,
            reset_time: decision.reset_time,
            limited: decision.limited,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStatus {
    pub general: QuotaSnapshot,
    pub weather_api: QuotaSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherLocation {
    pub city: String,
    pub country: String,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentWeather {
    pub temperature: i32,
    pub humidity: i32,
    pub wind_speed: i32,
    pub wind_direction: String,
    pub pressure: i32,
    pub visibility: i32,
    pub uv_index: i32,
    pub condition: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherForecast {
    pub date: String,
    pub high: i32,
    pub low: i32,
    pub condition: String,
    pub precipitation: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyWeather {
    pub hour: u32,
    pub temperature: i32,
    pub humidity: i32,
    pub wind_speed: i32,
    pub precipitation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherData {
    pub location: WeatherLocation,
    pub current: CurrentWeather,
    pub forecast: Vec<WeatherForecast>,
    pub hourly: Vec<HourlyWeather>,
    pub last_updated: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationResult {
    pub name: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

/// Services shared by every request for the lifetime of the process.
pub struct AppState {
    pub config: Config,
    pub cache: ResponseCache,
    pub rate_limiter: RateLimiter,
    pub provider: Arc<dyn WeatherProvider>,
}

impl AppState {
    pub fn new(config: Config, provider: Arc<dyn WeatherProvider>) -> Self {
        let rate_limiter = RateLimiter::new(
            config.rate_limit_window,
            config.general_limit,
            config.weather_api_limit,
        );
        Self {
            config,
            cache: ResponseCache::new(),
            rate_limiter,
            provider,
        }
    }
}
