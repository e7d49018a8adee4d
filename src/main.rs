use std::panic;
use std::sync::Arc;
use std::time::Duration;

use notes_relay::config::Config;
use notes_relay::relay::{RelayDispatcher, SessionRegistry};
use notes_relay::routes::build_router;
use tokio_util::sync::CancellationToken;
use tracing::{info, error, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main(flavor = "current_thread")]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration before tracing so LOG_LEVEL can seed the filter
    let loaded = Config::load();
    let log_filter = match &loaded {
        Ok(config) => config.log_filter(),
        Err(_) => Config::default().log_filter(),
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // LOG_LEVEL for everything, but allow debug for our app
            log_filter.into()
        }))
        .init();

    info!("Starting server...");

    let config = loaded.unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });
    let config = Arc::new(config);

    // The registry lives inside the dispatcher task for the whole server run
    let (relay, dispatcher) = RelayDispatcher::spawn(SessionRegistry::new());
    let shutdown = CancellationToken::new();

    let app_routes = build_router(config.clone(), relay, shutdown.clone());

    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 Relay available at ws://{}{}?noteId=<id>", config.server_address(), config.ws_path);
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    if let Err(e) = axum::serve(listener, app_routes)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
    {
        error!("Server error: {}", e);
    }

    // Relay connections close on the cancelled token and leave the dispatcher
    match tokio::time::timeout(Duration::from_secs(5), dispatcher).await {
        Ok(Ok(registry)) => info!("Relay stopped, {} sessions dropped", registry.session_count()),
        Ok(Err(e)) => error!("Relay dispatcher failed: {}", e),
        Err(_) => warn!("Relay dispatcher still busy at shutdown"),
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}
