use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::{Value, json};

use crate::server::AppState;
use crate::tools::{RecallResponse, StoreResponse, ToolDefinition};

/// Health check endpoint - returns JSON status
pub async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub async fn definitions_handler(State(state): State<Arc<AppState>>) -> Json<Vec<ToolDefinition>> {
    Json(state.tools.definitions())
}

pub async fn store_handler(
    State(state): State<Arc<AppState>>,
    Json(args): Json<Value>,
) -> Json<StoreResponse> {
    Json(state.tools.store(args).await)
}

pub async fn recall_handler(
    State(state): State<Arc<AppState>>,
    Json(args): Json<Value>,
) -> Json<RecallResponse> {
    Json(state.tools.recall(args).await)
}

pub async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.tools.service().stats().await {
        Ok(stats) => (StatusCode::OK, Json(json!(stats))),
        Err(e) => {
            tracing::warn!(error = %e, "Stats query failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": {"type": e.kind(), "message": e.to_string()}})),
            )
        }
    }
}
