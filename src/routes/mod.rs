pub mod api;

use std::sync::Arc;
use axum::{http::HeaderValue, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{config::Config, docs::ApiDoc, relay::RelayHandle, state::AppState, websocket::websocket_handler};
pub use api::create_api_routes;

/// Build the complete application router around a running relay
pub fn build_router(config: Arc<Config>, relay: RelayHandle, shutdown: CancellationToken) -> Router {
    let cors = cors_layer(&config);
    let static_files = ServeDir::new(&config.static_dir);
    let ws_path = config.ws_path.clone();
    let app_state = AppState::new(config, relay, shutdown);

    Router::new()
        // Relay endpoint
        .route(&ws_path, get(websocket_handler))
        // Mount API routes
        .nest("/api", create_api_routes())
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Everything else is the note app itself
        .fallback_service(static_files)
        .layer(cors)
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origin_list()
        .into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        if config.is_production() {
            warn!("No CORS origins configured in production, cross-origin requests are refused");
            return CorsLayer::new();
        }
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
