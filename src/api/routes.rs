use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::api::handlers;
use crate::comfyui::ComfyUIClient;
use crate::config::Config;
use crate::specs::SpecStore;

pub struct AppState {
    pub config: Config,
    pub comfyui_client: ComfyUIClient,
    pub specs: SpecStore,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        AppState {
            comfyui_client: ComfyUIClient::new(&config.comfyui_url),
            specs: SpecStore::from_config(&config),
            config,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/api/indexes", get(handlers::list_indexes))
        .route("/api/indexes/:id", get(handlers::get_index))
        .route("/api/indexes/:id/lists", get(handlers::get_index_lists))
        .route("/api/specs", get(handlers::list_specs).post(handlers::save_spec))
        .route("/api/list-files", get(handlers::list_files))
        .route("/api/image", get(handlers::serve_image))
        .route("/api/read-caption", get(handlers::read_caption))
        .route("/api/save-caption", post(handlers::save_caption))
        .route("/api/presets", get(handlers::presets))
        .route("/api/checkpoints", get(handlers::checkpoints))
        .route("/api/classify", post(handlers::classify))
        .route("/api/generate", post(handlers::generate))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
