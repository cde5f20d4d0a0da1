use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use codemole::{
    api,
    config::{GameConfig, ServerConfig},
    grading::GradingPipeline,
    llm,
    state::AppState,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codemole=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting codemole...");

    let server_config = ServerConfig::from_env();
    let game_config = GameConfig::from_env();
    let llm_config = llm::LlmConfig::from_env();
    let grader = GradingPipeline::from_config(&llm_config);

    if let Some(seed) = server_config.seed {
        tracing::info!("Using fixed game seed {}", seed);
    }

    let state = Arc::new(AppState::with_config(
        game_config,
        server_config.seed,
        grader,
    ));
    let app = api::router(state, server_config.client_origin.as_deref());

    let addr = server_config.bind_addr;
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("Listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
