//! HTTP endpoint handlers.

use super::AppState;
use crate::definition::{WorkerDefinition, WorkerRegistry};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Health check endpoint.
pub async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({"status": "ok", "workers": state.store.len().await}))
}

/// `GET /workers`: full snapshot.
pub async fn handle_list(State(state): State<Arc<AppState>>) -> Json<WorkerRegistry> {
    Json(state.store.snapshot().await)
}

/// `POST /workers/:name`: upsert, replacing any previous definition.
pub async fn handle_upsert(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Result<Json<WorkerDefinition>, JsonRejection>,
) -> impl IntoResponse {
    let definition = match body {
        Ok(Json(definition)) => definition,
        Err(rejection) => {
            warn!("Rejected definition for worker {}: {}", name, rejection.body_text());
            return (
                rejection.status(),
                Json(json!({"error": rejection.body_text()})),
            );
        }
    };

    let replaced = state.store.upsert(name.clone(), definition).await;
    debug!(
        "{} worker {}",
        if replaced { "Replaced" } else { "Registered" },
        name
    );

    (StatusCode::OK, Json(Value::Null))
}

/// `DELETE /workers/:name`: idempotent remove.
pub async fn handle_remove(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Json<Value> {
    if state.store.remove(&name).await {
        debug!("Unregistered worker {}", name);
    }
    Json(Value::Null)
}

/// `DELETE /workers`: drop every entry.
pub async fn handle_clear(State(state): State<Arc<AppState>>) -> Json<Value> {
    let count = state.store.clear().await;
    debug!("Cleared {} worker(s)", count);
    Json(Value::Null)
}
