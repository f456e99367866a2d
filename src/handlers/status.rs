// src/handlers/status.rs
use axum::{extract::Extension, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppState;

/// GET /api/status - Health check and configuration summary
pub async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let database = match &state.db_pool {
        Some(pool) if crate::db::ping(pool).await => "healthy",
        Some(_) => "unhealthy",
        None => "in_memory",
    };
    let gemini = if state.settings.gemini_api_key.is_some() {
        "configured"
    } else {
        "not_configured"
    };

    Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "media_library": database,
            "gemini_ai": gemini,
            "object_storage": format!("gs://{}", state.settings.storage_bucket),
        },
        "retro_games": {
            "themes": state.config.get_theme_names(),
            "image_model": state.settings.image_model,
            "text_model": state.settings.text_model,
        },
        "endpoints": {
            "status": "/api/status",
            "themes": "/api/retro-games/themes",
            "runs": "/api/retro-games/runs",
        }
    }))
}

pub fn status_routes() -> Router {
    Router::new().route("/api/status", get(api_status))
}
