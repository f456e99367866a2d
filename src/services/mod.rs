// src/services/mod.rs
//! Collaborator seams for the retro games workflow.
//!
//! The workflow never talks to a model API, a bucket or a database directly;
//! it goes through the traits below so the concrete adapters can be swapped
//! (and faked in tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::models::media_item::MediaItem;

pub mod media_library;
pub mod object_storage;
pub mod video_processing;

#[cfg(test)]
pub mod testing;

pub use media_library::{InMemoryMediaRepository, PostgresMediaRepository};
pub use object_storage::LocalObjectStore;
pub use video_processing::FfmpegVideoProcessor;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to decode base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Invalid storage URI: {0}")]
    InvalidUri(String),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

// Request URLs can carry credentials, so they never reach an error message
impl From<reqwest::Error> for ServiceError {
    fn from(error: reqwest::Error) -> Self {
        ServiceError::Http(error.without_url())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Image generation input: a prompt plus the images it should be conditioned on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    pub reference_images: Vec<String>,
    pub aspect_ratio: String,
    /// Object-storage folder the generated images are written to.
    pub output_folder: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceImage {
    pub uri: String,
    pub mime_type: String,
}

impl ReferenceImage {
    pub fn png(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: "image/png".to_string(),
        }
    }
}

/// Reference-to-video request. Field names follow the video model's
/// parameter names so adapters can map them one to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoGenerationRequest {
    pub prompt: String,
    pub reference_images: Vec<ReferenceImage>,
    pub duration_seconds: u32,
    pub aspect_ratio: String,
    pub resolution: String,
    pub model_version: String,
    pub sample_count: u32,
    pub enhance_prompt: bool,
    pub person_generation: String,
}

/// How clips are joined. `Concat` joins every input back to back; the
/// other modes blend the first two inputs with an ffmpeg `xfade`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Transition {
    #[default]
    #[serde(rename = "concat")]
    Concat,
    #[serde(rename = "x-fade")]
    Crossfade,
    #[serde(rename = "wipe")]
    Wipe,
    #[serde(rename = "dipToBlack")]
    DipToBlack,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns the storage URIs of the generated images. An empty vector
    /// means the model answered without an image.
    async fn generate_image(&self, request: ImageGenerationRequest) -> ServiceResult<Vec<String>>;
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str, media_uris: &[String]) -> ServiceResult<String>;
}

#[async_trait]
pub trait VideoGenerator: Send + Sync {
    async fn generate_video(&self, request: VideoGenerationRequest) -> ServiceResult<Vec<String>>;
}

#[async_trait]
pub trait VideoProcessor: Send + Sync {
    /// Joins the videos in order and returns the URI of the merged clip.
    async fn process_videos(&self, video_uris: &[String], transition: Transition) -> ServiceResult<String>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn store(
        &self,
        folder: &str,
        filename: &str,
        mime_type: &str,
        contents: Vec<u8>,
    ) -> ServiceResult<String>;

    async fn download(&self, uri: &str) -> ServiceResult<Vec<u8>>;
}

#[async_trait]
pub trait MediaRepository: Send + Sync {
    /// Persists the item and returns its document id.
    async fn add_media_item(&self, item: MediaItem) -> ServiceResult<String>;
}

/// Every collaborator the workflow needs, shared across runs.
#[derive(Clone)]
pub struct GenerationServices {
    pub images: Arc<dyn ImageGenerator>,
    pub text: Arc<dyn TextGenerator>,
    pub video: Arc<dyn VideoGenerator>,
    pub video_processor: Arc<dyn VideoProcessor>,
    pub storage: Arc<dyn ObjectStore>,
    pub media: Arc<dyn MediaRepository>,
}

/// Best-effort MIME type from a URI's extension.
pub fn mime_type_for(uri: &str) -> &'static str {
    let lower = uri.to_ascii_lowercase();
    let extension = lower.rsplit('.').next().unwrap_or_default();
    match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp4" | "mov" | "avi" | "mkv" | "webm" => "video/mp4",
        "wav" | "mp3" | "flac" => "audio/wav",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}
