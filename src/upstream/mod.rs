//! Weather provider boundary.
//!
//! Handlers talk to a [`WeatherProvider`]; production wires in
//! [`OpenWeatherClient`], tests substitute their own.

mod format;
mod mock;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Uri};
use hyper_rustls::HttpsConnector;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::time::timeout;
use tracing::debug;

use crate::clock::iso_now;
use crate::config::Config;
use crate::errors::UpstreamError;
use crate::models::{Coordinates, LocationResult, WeatherData, WeatherLocation};

pub use format::{capitalize_words, map_weather_icon, wind_direction};
pub(crate) use format::{format_current, format_forecast};
pub use mock::{mock_weather, popular_locations};


const SEARCH_RESULT_LIMIT: u32 = 5;

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Whether credentials for the provider are available.
    fn is_configured(&self) -> bool;

    async fn weather(&self, lat: f64, lon: f64) -> Result<WeatherData, UpstreamError>;

    async fn search_locations(&self, query: &str) -> Result<Vec<LocationResult>, UpstreamError>;
}

#[derive(Debug, Deserialize)]
pub(crate) struct MainReading {
    pub temp: f64,
    #[serde(default)]
    pub temp_min: Option<f64>,
    #[serde(default)]
    pub temp_max: Option<f64>,
    pub humidity: f64,
    #[serde(default)]
    pub pressure: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WindReading {
    pub speed: f64,
    #[serde(default)]
    pub deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConditionReading {
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurrentResponse {
    pub main: MainReading,
    pub wind: WindReading,
    #[serde(default)]
    pub visibility: Option<f64>,
    pub weather: Vec<ConditionReading>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ForecastItem {
    pub dt: i64,
    pub main: MainReading,
    pub wind: WindReading,
    pub weather: Vec<ConditionReading>,
    #[serde(default)]
    pub pop: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ForecastResponse {
    pub list: Vec<ForecastItem>,
}

#[derive(Debug, Deserialize)]
struct GeoEntry {
    name: String,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    state: Option<String>,
    lat: f64,
    lon: f64,
}

impl From<GeoEntry> for LocationResult {
    fn from(entry: GeoEntry) -> Self {
        Self {
            name: entry.name,
            country: entry.country.unwrap_or_default(),
            state: entry.state,
            lat: entry.lat,
            lon: entry.lon,
        }
    }
}

/// OpenWeatherMap client for current conditions, forecasts and geocoding.
#[derive(Clone)]
pub struct OpenWeatherClient {
    client: Client<HttpsConnector<HttpConnector>, Body>,
    api_key: Option<String>,
    base_url: String,
    geocoding_url: String,
    request_timeout: Duration,
}

impl OpenWeatherClient {
    pub fn new(config: &Config) -> Self {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        Self {
            client: Client::builder().build::<_, Body>(https),
            api_key: config.api_key.clone(),
            base_url: config.weather_base_url.trim_end_matches('/').to_string(),
            geocoding_url: config.geocoding_base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
        }
    }

    fn api_key(&self) -> Result<&str, UpstreamError> {
        self.api_key.as_deref().ok_or(UpstreamError::MissingCredentials)
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        base: &str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let query = serde_urlencoded::to_string(params)?;
        let uri: Uri = format!("{base}{path}?{query}")
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| UpstreamError::InvalidUri(e.to_string()))?;

        // The query carries the API key, so only the path is logged.
        debug!(path, "calling weather provider");
        let response = timeout(self.request_timeout, self.client.get(uri))
            .await
            .map_err(|_| UpstreamError::Timeout)??;

        let status = response.status();
        let body: Bytes = hyper::body::to_bytes(response.into_body()).await?;
        if !status.is_success() {
            return Err(UpstreamError::Status(status));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    async fn current(&self, lat: f64, lon: f64) -> Result<CurrentResponse, UpstreamError> {
        let params = [
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("appid", self.api_key()?.to_string()),
            ("units", "metric".to_string()),
        ];
        self.fetch_json(&self.base_url, "/weather", &params).await
    }

    async fn forecast(&self, lat: f64, lon: f64) -> Result<ForecastResponse, UpstreamError> {
        let params = [
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("appid", self.api_key()?.to_string()),
            ("units", "metric".to_string()),
        ];
        self.fetch_json(&self.base_url, "/forecast", &params).await
    }

    async fn reverse_geocode(&self, lat: f64, lon: f64) -> Result<Option<GeoEntry>, UpstreamError> {
        let params = [
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("limit", "1".to_string()),
            ("appid", self.api_key()?.to_string()),
        ];
        let entries: Vec<GeoEntry> = self
            .fetch_json(&self.geocoding_url, "/reverse", &params)
            .await?;
        Ok(entries.into_iter().next())
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn weather(&self, lat: f64, lon: f64) -> Result<WeatherData, UpstreamError> {
        self.api_key()?;
        let (current, forecast) =
            futures::try_join!(self.current(lat, lon), self.forecast(lat, lon))?;
        let place = self.reverse_geocode(lat, lon).await?;

        let (city, country) = match place {
            Some(entry) => (entry.name, entry.country.unwrap_or_else(|| "Unknown".to_string())),
            None => ("Unknown".to_string(), "Unknown".to_string()),
        };
        let (daily, hourly) = format_forecast(&forecast, format::local_hour());

        Ok(WeatherData {
            location: WeatherLocation {
                city,
                country,
                coordinates: Coordinates { lat, lon },
            },
            current: format_current(&current),
            forecast: daily,
            hourly,
            last_updated: iso_now(),
        })
    }

    async fn search_locations(&self, query: &str) -> Result<Vec<LocationResult>, UpstreamError> {
        let params = [
            ("q", query.to_string()),
            ("limit", SEARCH_RESULT_LIMIT.to_string()),
            ("appid", self.api_key()?.to_string()),
        ];
        let entries: Vec<GeoEntry> = self
            .fetch_json(&self.geocoding_url, "/direct", &params)
            .await?;
        Ok(entries.into_iter().map(LocationResult::from).collect())
    }
}
