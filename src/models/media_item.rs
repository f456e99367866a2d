// src/models/media_item.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A finished generation as recorded in the media library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Document id; assigned by the repository when absent.
    pub id: Option<String>,
    pub user_email: String,
    pub timestamp: DateTime<Utc>,
    pub media_type: String,
    pub mime_type: String,
    /// Single-file artifact (the final video).
    pub gcs_uri: String,
    pub gcs_uris: Vec<String>,
    /// Final prompt sent to the model; the scene direction for retro game videos.
    pub prompt: Option<String>,
    pub model: String,
    pub duration: f64,
    /// Wall-clock seconds spent generating.
    pub generation_time: f64,
    pub comment: Option<String>,
    pub mode: String,
    pub r2v_reference_images: Vec<String>,
    pub source_uris: Vec<String>,
}
