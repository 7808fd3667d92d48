use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use assetgen::api;
use assetgen::config::Config;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    Config::dotenv_load();
    let config = Config::new();
    Config::log_env_vars();

    let socket_address = config.socket_address();
    let state = Arc::new(api::AppState::new(config));
    let app = api::router(state);

    tracing::info!("listening on {}", socket_address);
    if let Err(e) = axum::Server::bind(&socket_address).serve(app.into_make_service()).await {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }
}
