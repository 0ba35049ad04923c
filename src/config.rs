use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 5001;
pub const OPENWEATHER_BASE: &str = "https://api.openweathermap.org/data/2.5";
pub const OPENWEATHER_GEO_BASE: &str = "https://api.openweathermap.org/geo/1.0";
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;
pub const RATE_LIMIT_REQUESTS: u32 = 100; // requests per window per client
pub const WEATHER_API_REQUESTS: u32 = 10; // upstream-calling requests per window per client
pub const WEATHER_CACHE_SECS: u64 = 300; // 5 minutes
pub const SEARCH_CACHE_SECS: u64 = 600; // 10 minutes
pub const CACHE_SWEEP_SECS: u64 = 60;
pub const RATE_LIMIT_SWEEP_SECS: u64 = 300;
// Upper bound for every configured duration.
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

// San Francisco, used when /api/weather is called without coordinates.
pub const DEFAULT_LAT: f64 = 37.7749;
pub const DEFAULT_LON: f64 = -122.4194;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{key} must be at most {max} seconds")]
    TooLarge { key: &'static str, max: u64 },
}

/// Process-wide settings, fixed once the server starts.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub api_key: Option<String>,
    /// Key clients on the first `X-Forwarded-For` hop instead of the peer address.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
    pub weather_base_url: String,
    pub geocoding_base_url: String,
    pub request_timeout: Duration,
    pub rate_limit_window: Duration,
    pub general_limit: u32,
    pub weather_api_limit: u32,
    pub weather_cache_ttl: Duration,
    pub search_cache_ttl: Duration,
    pub cache_sweep_interval: Duration,
    pub rate_limit_sweep_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            api_key: None,
            trust_forwarded_for: false,
            weather_base_url: OPENWEATHER_BASE.to_string(),
            geocoding_base_url: OPENWEATHER_GEO_BASE.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            rate_limit_window: Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
            general_limit: RATE_LIMIT_REQUESTS,
            weather_api_limit: WEATHER_API_REQUESTS,
            weather_cache_ttl: Duration::from_secs(WEATHER_CACHE_SECS),
            search_cache_ttl: Duration::from_secs(SEARCH_CACHE_SECS),
            cache_sweep_interval: Duration::from_secs(CACHE_SWEEP_SECS),
            rate_limit_sweep_interval: Duration::from_secs(RATE_LIMIT_SWEEP_SECS),
        }
    }
}

impl Config {
    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from defaults, overriding any key `lookup` returns a value for.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |key: &'static str, fallback: Duration| -> Result<Duration, ConfigError> {
            parse_or(&lookup, key, fallback.as_secs()).map(Duration::from_secs)
        };

        let config = Self {
            host: parse_or(&lookup, "HOST", defaults.host)?,
            port: parse_or(&lookup, "PORT", defaults.port)?,
            api_key: lookup("OPENWEATHER_API_KEY")
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            trust_forwarded_for: parse_or(&lookup, "TRUST_FORWARDED_FOR", defaults.trust_forwarded_for)?,
            weather_base_url: lookup("OPENWEATHER_BASE_URL").unwrap_or(defaults.weather_base_url),
            geocoding_base_url: lookup("OPENWEATHER_GEO_URL").unwrap_or(defaults.geocoding_base_url),
            request_timeout: secs("REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,
            rate_limit_window: secs("RATE_LIMIT_WINDOW_SECS", defaults.rate_limit_window)?,
            general_limit: parse_or(&lookup, "RATE_LIMIT_MAX_REQUESTS", defaults.general_limit)?,
            weather_api_limit: parse_or(&lookup, "WEATHER_API_RATE_LIMIT", defaults.weather_api_limit)?,
            weather_cache_ttl: secs("WEATHER_CACHE_TTL_SECS", defaults.weather_cache_ttl)?,
            search_cache_ttl: secs("SEARCH_CACHE_TTL_SECS", defaults.search_cache_ttl)?,
            cache_sweep_interval: secs("CACHE_SWEEP_INTERVAL_SECS", defaults.cache_sweep_interval)?,
            rate_limit_sweep_interval: secs(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS",
                defaults.rate_limit_sweep_interval,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("REQUEST_TIMEOUT_SECS", self.request_timeout),
            ("RATE_LIMIT_WINDOW_SECS", self.rate_limit_window),
            ("WEATHER_CACHE_TTL_SECS", self.weather_cache_ttl),
            ("SEARCH_CACHE_TTL_SECS", self.search_cache_ttl),
            ("CACHE_SWEEP_INTERVAL_SECS", self.cache_sweep_interval),
            ("RATE_LIMIT_SWEEP_INTERVAL_SECS", self.rate_limit_sweep_interval),
        ];
        for (key, value) in durations {
            if value > Duration::from_secs(MAX_DURATION_SECS) {
                return Err(ConfigError::TooLarge {
                    key,
                    max: MAX_DURATION_SECS,
                });
            }
        }
        if self.rate_limit_window.is_zero() {
            return Err(ConfigError::Zero("RATE_LIMIT_WINDOW_SECS"));
        }
        if self.general_limit == 0 {
            return Err(ConfigError::Zero("RATE_LIMIT_MAX_REQUESTS"));
        }
        if self.weather_api_limit == 0 {
            return Err(ConfigError::Zero("WEATHER_API_RATE_LIMIT"));
        }
        if self.cache_sweep_interval.is_zero() {
            return Err(ConfigError::Zero("CACHE_SWEEP_INTERVAL_SECS"));
        }
        if self.rate_limit_sweep_interval.is_zero() {
            return Err(ConfigError::Zero("RATE_LIMIT_SWEEP_INTERVAL_SECS"));
        }
        Ok(())
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, fallback: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.general_limit, 100);
        assert_eq!(config.weather_api_limit, 10);
        assert_eq!(config.weather_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.search_cache_ttl, Duration::from_secs(600));
        assert!(!config.has_credentials());
        assert!(!config.trust_forwarded_for);
    }

    #[test]
    fn test_overrides_are_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("OPENWEATHER_API_KEY", "abc123"),
            ("WEATHER_API_RATE_LIMIT", "3"),
            ("RATE_LIMIT_WINDOW_SECS", "10"),
            ("TRUST_FORWARDED_FOR", "true"),
        ]))
        .unwrap();
        assert!(config.trust_forwarded_for);
        assert_eq!(config.port, 8080);
        assert_eq!(config.api_key.as_deref(), Some("abc123"));
        assert_eq!(config.weather_api_limit, 3);
        assert_eq!(config.rate_limit_window, Duration::from_secs(10));
    }

    #[test]
    fn test_blank_api_key_counts_as_missing() {
        let config = Config::from_lookup(lookup_from(&[("OPENWEATHER_API_KEY", "  ")])).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = Config::from_lookup(lookup_from(&[("PORT", "not-a-port")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "PORT",
                value: "not-a-port".to_string()
            }
        );
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let err = Config::from_lookup(lookup_from(&[("RATE_LIMIT_MAX_REQUESTS", "0")])).unwrap_err();
        assert_eq!(err, ConfigError::Zero("RATE_LIMIT_MAX_REQUESTS"));
    }

    #[test]
    fn test_oversized_durations_are_rejected() {
        let huge = u64::MAX.to_string();
        let err = Config::from_lookup(lookup_from(&[("WEATHER_CACHE_TTL_SECS", huge.as_str())])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::TooLarge {
                key: "WEATHER_CACHE_TTL_SECS",
                max: MAX_DURATION_SECS
            }
        );

        let err = Config::from_lookup(lookup_from(&[("RATE_LIMIT_WINDOW_SECS", "99999999999")])).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge { key: "RATE_LIMIT_WINDOW_SECS", .. }));
    }
}
