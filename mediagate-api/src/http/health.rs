//! Liveness endpoints

use axum::{routing::get, Json, Router};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::http::AppState;

/// Health check router
pub fn create_health_router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health_check))
}

/// Service banner
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Media Gateway API",
        "status": "active",
    }))
}

/// Always healthy while the process serves requests
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    }))
}
