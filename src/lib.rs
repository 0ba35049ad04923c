pub mod cache;
pub mod clock;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod services;
pub mod upstream;

pub use cache::ResponseCache;
pub use config::Config;
pub use errors::{ApiError, UpstreamError};
pub use models::{AppState, CacheEntry, QuotaDecision, WeatherData};
pub use rate_limit::RateLimiter;
pub use routes::routes;
pub use upstream::{OpenWeatherClient, WeatherProvider};
