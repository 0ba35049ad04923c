use std::convert::Infallible;
use std::sync::Arc;

use tracing::info;
use warp::{Filter, Reply};

use crate::handlers;
use crate::middleware::client_identity;
use crate::models::AppState;

/// The full HTTP surface: `/api/health`, `/api/weather` and `/api/search-location`.
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let trust_forwarded_for = state.config.trust_forwarded_for;
    let state_filter = warp::any().map(move || state.clone());

    let health = warp::path!("api" / "health")
        .and(warp::get())
        .and(client_identity(trust_forwarded_for))
        .and(state_filter.clone())
        .and_then(handlers::health);

    let weather = warp::path!("api" / "weather")
        .and(warp::get())
        .and(warp::path::full())
        .and(raw_query())
        .and(client_identity(trust_forwarded_for))
        .and(state_filter.clone())
        .and_then(handlers::weather);

    let search = warp::path!("api" / "search-location")
        .and(warp::get())
        .and(warp::path::full())
        .and(raw_query())
        .and(client_identity(trust_forwarded_for))
        .and(state_filter)
        .and_then(handlers::search_location);

    health
        .or(weather)
        .or(search)
        .recover(handlers::handle_rejection)
        .with(warp::log::custom(log_request))
}

// Requests without a query string still match, with an empty query.
fn raw_query() -> impl Filter<Extract = (String,), Error = Infallible> + Clone {
    warp::query::raw().or_else(|_| async { Ok::<(String,), Infallible>((String::new(),)) })
}

fn log_request(info: warp::log::Info<'_>) {
    info!(
        method = %info.method(),
        path = info.path(),
        status = info.status().as_u16(),
        elapsed_ms = info.elapsed().as_millis() as u64,
        "request"
    );
}
