use hyper::StatusCode;
use thiserror::Error;

/// Which quota rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaScope {
    General,
    WeatherApi,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limit exceeded")]
    QuotaExceeded {
        scope: QuotaScope,
        reset_time: i64,
        retry_after: i64,
    },

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl warp::reject::Reject for ApiError {}

/// Failures talking to the weather provider.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("no API key configured for the weather provider")]
    MissingCredentials,

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("HTTP Error: {0}")]
    Http(#[from] hyper::Error),

    #[error("provider responded with status {0}")]
    Status(StatusCode),

    #[error("failed to encode query: {0}")]
    Encode(#[from] serde_urlencoded::ser::Error),

    #[error("failed to decode provider response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Request timed out")]
    Timeout,
}
