use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::state::AppState;

/// Liveness check with cache occupancy.
pub async fn healthz(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "cache": state.resolver.snapshot().stats(),
    }))
}
