//! Main Entrypoint for the MedVoice API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Wiring the board client, tool catalogue, and Gemini connector.
//! 3. Starting the session registry and its background sweeper.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use medvoice_api::{
    board::{clinical_tool_registry, BoardClient},
    config::Config,
    router::create_router,
    state::AppState,
    voice::provider::gemini::GeminiLiveConnector,
    voice::registry::{RegistrySettings, SessionRegistry},
    voice::sweeper,
};
use medvoice_core::{ContextProvider, UpstreamConnector};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "Failed to install Ctrl+C handler");
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let board = BoardClient::new(config.board_base_url.clone());
    let tools = Arc::new(clinical_tool_registry(board.clone()));
    info!(tool_count = tools.len(), "Clinical tool catalogue ready");

    let connector: Arc<dyn UpstreamConnector> = Arc::new(GeminiLiveConnector::new(
        config.gemini_api_key.clone(),
        config.live_model.clone(),
        config.voice_name.clone(),
    ));
    let context: Arc<dyn ContextProvider> = Arc::new(board);

    let registry = SessionRegistry::new(
        connector,
        context,
        tools.clone(),
        RegistrySettings {
            upstream_open_timeout: config.upstream_open_timeout,
            context_summary_limit: config.context_summary_limit,
            system_prompt_path: config.system_prompt_path.clone(),
        },
    );

    // --- 4. Start the Session Sweeper ---
    let sweeper_handle = sweeper::spawn(
        registry.clone(),
        config.sweep_interval,
        config.session_ttl,
    );

    let app_state = AppState {
        registry,
        tools,
        config: Arc::new(config.clone()),
    };

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        model = %config.live_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper_handle.abort();
    info!("Server has shut down.");
    Ok(())
}
