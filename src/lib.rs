// lib.rs - Retro games studio: turns player photos into a short 8-bit video game clip
pub mod db;
pub mod gemini_client;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod services;
pub mod settings;
pub mod veo_client;
pub mod workflow;

use std::sync::Arc;

// Shared by every handler through an axum `Extension`
pub struct AppState {
    pub config: Arc<workflow::RetroGameConfig>,
    pub runs: Arc<jobs::RunManager>,
    pub db_pool: Option<sqlx::PgPool>,
    pub settings: settings::Settings,
}
