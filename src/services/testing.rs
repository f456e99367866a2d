// src/services/testing.rs
//! Scriptable collaborator fakes for unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use super::*;
use crate::models::media_item::MediaItem;
use crate::services::media_library::InMemoryMediaRepository;

fn scripted_error(message: &str) -> ServiceError {
    ServiceError::Api {
        status: 500,
        body: message.to_string(),
    }
}

/// Pops scripted responses; once the script runs dry every call succeeds
/// with one URI inside the requested folder.
#[derive(Default)]
pub struct FakeImageGenerator {
    script: Mutex<VecDeque<Result<Vec<String>, String>>>,
    pub requests: Mutex<Vec<ImageGenerationRequest>>,
}

impl FakeImageGenerator {
    pub fn push(&self, response: Result<Vec<String>, String>) {
        self.script.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> Vec<ImageGenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for FakeImageGenerator {
    async fn generate_image(&self, request: ImageGenerationRequest) -> ServiceResult<Vec<String>> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        let call = requests.len();
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(uris)) => Ok(uris),
            Some(Err(message)) => Err(scripted_error(&message)),
            None => Ok(vec![format!("gs://test/{}/image_{}.png", request.output_folder, call)]),
        }
    }
}

pub struct FakeTextGenerator {
    response: Result<String, String>,
    pub prompts: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeTextGenerator {
    pub fn replying(text: &str) -> Self {
        Self {
            response: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TextGenerator for FakeTextGenerator {
    async fn generate_text(&self, prompt: &str, media_uris: &[String]) -> ServiceResult<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), media_uris.to_vec()));
        self.response.clone().map_err(|m| scripted_error(&m))
    }
}

pub struct FakeVideoGenerator {
    response: Result<Vec<String>, String>,
    pub requests: Mutex<Vec<VideoGenerationRequest>>,
}

impl FakeVideoGenerator {
    pub fn returning(uris: Vec<String>) -> Self {
        Self {
            response: Ok(uris),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<VideoGenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl VideoGenerator for FakeVideoGenerator {
    async fn generate_video(&self, request: VideoGenerationRequest) -> ServiceResult<Vec<String>> {
        self.requests.lock().unwrap().push(request);
        self.response.clone().map_err(|m| scripted_error(&m))
    }
}

pub struct FakeVideoProcessor {
    response: Result<String, String>,
    pub calls: Mutex<Vec<(Vec<String>, Transition)>>,
}

impl FakeVideoProcessor {
    pub fn returning(uri: &str) -> Self {
        Self {
            response: Ok(uri.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl VideoProcessor for FakeVideoProcessor {
    async fn process_videos(&self, video_uris: &[String], transition: Transition) -> ServiceResult<String> {
        self.calls.lock().unwrap().push((video_uris.to_vec(), transition));
        self.response.clone().map_err(|m| scripted_error(&m))
    }
}

/// Object store backed by a map; URIs use the `memory` bucket.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn insert(&self, uri: &str, contents: Vec<u8>) {
        self.objects.lock().unwrap().insert(uri.to_string(), contents);
    }

    pub fn get(&self, uri: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(uri).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn store(&self, folder: &str, filename: &str, _mime_type: &str, contents: Vec<u8>) -> ServiceResult<String> {
        let uri = format!("gs://memory/{}/{}", folder, filename);
        self.insert(&uri, contents);
        Ok(uri)
    }

    async fn download(&self, uri: &str) -> ServiceResult<Vec<u8>> {
        self.get(uri).ok_or_else(|| ServiceError::NotFound(uri.to_string()))
    }
}

pub struct FailingMediaRepository;

#[async_trait]
impl MediaRepository for FailingMediaRepository {
    async fn add_media_item(&self, _item: MediaItem) -> ServiceResult<String> {
        Err(scripted_error("firestore unavailable"))
    }
}

/// Handles on every fake so tests can script inputs and inspect calls.
pub struct FakeServices {
    pub images: Arc<FakeImageGenerator>,
    pub text: Arc<FakeTextGenerator>,
    pub video: Arc<FakeVideoGenerator>,
    pub processor: Arc<FakeVideoProcessor>,
    pub storage: Arc<MemoryObjectStore>,
    pub media: Arc<InMemoryMediaRepository>,
}

impl FakeServices {
    /// Every collaborator succeeds.
    pub fn happy() -> Self {
        Self {
            images: Arc::new(FakeImageGenerator::default()),
            text: Arc::new(FakeTextGenerator::replying("Two pixel heroes race across a neon skyline.")),
            video: Arc::new(FakeVideoGenerator::returning(vec!["gs://test/retro_games_videos/raw.mp4".to_string()])),
            processor: Arc::new(FakeVideoProcessor::returning("gs://test/processed_videos/final.mp4")),
            storage: Arc::new(MemoryObjectStore::default()),
            media: Arc::new(InMemoryMediaRepository::new()),
        }
    }

    pub fn with_processor(mut self, processor: FakeVideoProcessor) -> Self {
        self.processor = Arc::new(processor);
        self
    }

    pub fn with_video(mut self, video: FakeVideoGenerator) -> Self {
        self.video = Arc::new(video);
        self
    }

    pub fn with_text(mut self, text: FakeTextGenerator) -> Self {
        self.text = Arc::new(text);
        self
    }

    pub fn services(&self) -> GenerationServices {
        GenerationServices {
            images: self.images.clone(),
            text: self.text.clone(),
            video: self.video.clone(),
            video_processor: self.processor.clone(),
            storage: self.storage.clone(),
            media: self.media.clone(),
        }
    }
}

/// Theme/bumper configuration shared by workflow tests.
pub const TEST_CONFIG_JSON: &str = r#"{
    "themes": {
        "Google": {
            "prompt": "Use the four Google brand colours.",
            "logo_uri": "gs://test/logos/google.png",
            "logo_8bit_uri": "gs://test/logos/google_8bit.png"
        },
        "Dish": {
            "prompt": "Set everything in a satellite TV studio.",
            "logo_uri": "gs://test/logos/dish.png",
            "logo_8bit_uri": "gs://test/logos/dish_8bit.png"
        }
    },
    "bumper_videos": ["gs://test/bumpers/google_bumper.mp4"]
}"#;

pub const TEST_PROMPTS_JSON: &str = r#"{
    "8bit_generation": "Make an 8-bit sprite. {theme_prompt}",
    "character_sheet": "Draw a character sheet.",
    "scene_direction": "Direct {duration}s, {scene_count} scene(s), featuring {characters}.{theme_context}"
}"#;
