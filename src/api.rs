//! HTTP surface: health check, category listing and the WebSocket route

use axum::{extract::State, http::HeaderValue, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;
use crate::ws;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub sessions: usize,
    pub grading_available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryInfo {
    pub id: &'static str,
    pub label: &'static str,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
        sessions: state.registry.len().await,
        grading_available: state.grader.is_available(),
    })
}

/// GET /api/categories
///
/// Categories players can vote for, in catalog order.
pub async fn list_categories(State(state): State<Arc<AppState>>) -> Json<Vec<CategoryInfo>> {
    Json(
        state
            .catalog
            .categories()
            .into_iter()
            .map(|category| CategoryInfo {
                id: category.id(),
                label: category.label(),
            })
            .collect(),
    )
}

fn cors_layer(client_origin: Option<&str>) -> CorsLayer {
    match client_origin.map(str::parse::<HeaderValue>) {
        Some(Ok(origin)) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        Some(Err(e)) => {
            tracing::warn!("Ignoring invalid CLIENT_URL ({}), allowing any origin", e);
            CorsLayer::permissive()
        }
        None => CorsLayer::permissive(),
    }
}

/// Full application router
pub fn router(state: Arc<AppState>, client_origin: Option<&str>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .route("/api/categories", get(list_categories))
        .layer(cors_layer(client_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
