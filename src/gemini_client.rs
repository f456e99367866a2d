use async_trait::async_trait;
use base64::prelude::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::services::{
    mime_type_for, ImageGenerationRequest, ImageGenerator, ObjectStore, ServiceError, ServiceResult,
    TextGenerator,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini API client for image and text generation.
///
/// Reference media is read from the object store and sent inline; generated
/// images are written back to the object store and returned as URIs.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    image_model: String,
    text_model: String,
    storage: Arc<dyn ObjectStore>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Other(serde_json::Value),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String, // base64 encoded data
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    #[serde(rename = "responseModalities", skip_serializing_if = "Option::is_none")]
    pub response_modalities: Option<Vec<String>>,
    #[serde(rename = "imageConfig", skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(rename = "aspectRatio")]
    pub aspect_ratio: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
    #[serde(rename = "finishReason")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptFeedback {
    #[serde(rename = "blockReason")]
    pub block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn first_parts(&self) -> &[Part] {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| content.parts.as_slice())
            .unwrap_or_default()
    }

    /// Inline payloads of the first candidate, in order.
    pub fn inline_images(&self) -> Vec<&InlineData> {
        self.first_parts()
            .iter()
            .filter_map(|part| match part {
                Part::InlineData { inline_data } => Some(inline_data),
                _ => None,
            })
            .collect()
    }

    /// Concatenated text of the first candidate.
    pub fn text(&self) -> String {
        self.first_parts()
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<&str>>()
            .join("")
    }
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        image_model: String,
        text_model: String,
        storage: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            image_model,
            text_model,
            storage,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> ServiceResult<GenerateContentResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        tracing::debug!(model = %model, parts = request.contents.iter().map(|c| c.parts.len()).sum::<usize>(), "Gemini request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;
        if !status.is_success() {
            return Err(ServiceError::Api {
                status: status.as_u16(),
                body: response_text,
            });
        }

        tracing::debug!("Gemini API response (truncated): {}...", &response_text[..floor_char_boundary(&response_text, 500)]);
        let parsed: GenerateContentResponse = serde_json::from_str(&response_text)?;
        if let Some(reason) = parsed.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_ref()) {
            tracing::warn!(model = %model, block_reason = %reason, "Gemini blocked the prompt");
        }
        Ok(parsed)
    }

    /// Builds a single user turn: the prompt followed by each referenced media file.
    async fn user_content(&self, prompt: &str, media_uris: &[String]) -> ServiceResult<Content> {
        let mut parts = vec![Part::Text {
            text: prompt.to_string(),
        }];
        for uri in media_uris {
            let bytes = self.storage.download(uri).await?;
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: mime_type_for(uri).to_string(),
                    data: BASE64_STANDARD.encode(bytes),
                },
            });
        }
        Ok(Content {
            parts,
            role: Some("user".to_string()),
        })
    }
}

fn floor_char_boundary(text: &str, max: usize) -> usize {
    let mut end = text.len().min(max);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate_image(&self, request: ImageGenerationRequest) -> ServiceResult<Vec<String>> {
        let body = GenerateContentRequest {
            contents: vec![self.user_content(&request.prompt, &request.reference_images).await?],
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["IMAGE".to_string()]),
                image_config: Some(ImageConfig {
                    aspect_ratio: request.aspect_ratio.clone(),
                }),
            }),
        };

        let response = self.generate_content(&self.image_model, &body).await?;
        let images = response.inline_images();
        if images.is_empty() {
            tracing::warn!(model = %self.image_model, text = %response.text(), "Gemini returned no image");
        }

        let mut uris = Vec::with_capacity(images.len());
        for (i, image) in images.into_iter().enumerate() {
            let bytes = BASE64_STANDARD.decode(&image.data)?;
            let filename = format!("image_{}_{}.{}", Uuid::new_v4(), i, extension_for(&image.mime_type));
            let uri = self
                .storage
                .store(&request.output_folder, &filename, &image.mime_type, bytes)
                .await?;
            uris.push(uri);
        }
        Ok(uris)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate_text(&self, prompt: &str, media_uris: &[String]) -> ServiceResult<String> {
        let body = GenerateContentRequest {
            contents: vec![self.user_content(prompt, media_uris).await?],
            generation_config: None,
        };
        let response = self.generate_content(&self.text_model, &body).await?;
        Ok(response.text())
    }
}
