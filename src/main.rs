use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use weather_gateway::{routes, services::spawn_sweepers, AppState, Config, OpenWeatherClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = Config::from_env()?;
    if !config.has_credentials() {
        warn!("OPENWEATHER_API_KEY is not set; weather requests will be served from mock data");
    }

    let addr = SocketAddr::new(config.host, config.port);
    let provider = Arc::new(OpenWeatherClient::new(&config));
    let state = Arc::new(AppState::new(config, provider));
    let sweepers = spawn_sweepers(state.clone());

    let (bound, server) =
        warp::serve(routes(state)).try_bind_with_graceful_shutdown(addr, async {
            tokio::signal::ctrl_c().await.ok();
        })?;
    info!(%bound, "weather dashboard API running");
    server.await;

    for sweeper in sweepers {
        sweeper.abort();
    }
    info!("server stopped");
    Ok(())
}
