//! Health check route.

use axum::Json;
use serde_json::{json, Value};

pub async fn get_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "confide",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
