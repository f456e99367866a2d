// src/settings.rs
//! Process settings read from the environment (after `.env` is loaded).

use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "config/retro_games/config.json";
pub const DEFAULT_PROMPTS_PATH: &str = "config/retro_games/prompts.json";
pub const DEFAULT_STORAGE_ROOT: &str = "outputs";
pub const DEFAULT_STORAGE_BUCKET: &str = "genmedia-local";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub gemini_api_key: Option<String>,
    pub database_url: Option<String>,
    pub config_path: PathBuf,
    pub prompts_path: PathBuf,
    pub storage_root: PathBuf,
    pub storage_bucket: String,
    pub image_model: String,
    pub text_model: String,
    pub bind_addr: String,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        Self {
            gemini_api_key: get("GEMINI_API_KEY"),
            database_url: get("DATABASE_URL"),
            config_path: PathBuf::from(get_or("RETRO_GAMES_CONFIG_PATH", DEFAULT_CONFIG_PATH)),
            prompts_path: PathBuf::from(get_or("RETRO_GAMES_PROMPTS_PATH", DEFAULT_PROMPTS_PATH)),
            storage_root: PathBuf::from(get_or("STORAGE_ROOT", DEFAULT_STORAGE_ROOT)),
            storage_bucket: get_or("STORAGE_BUCKET", DEFAULT_STORAGE_BUCKET),
            image_model: get_or("GEMINI_IMAGE_MODEL", DEFAULT_IMAGE_MODEL),
            text_model: get_or("GEMINI_TEXT_MODEL", DEFAULT_TEXT_MODEL),
            bind_addr: get_or("BIND_ADDR", DEFAULT_BIND_ADDR),
        }
    }
}
