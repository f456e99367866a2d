// src/veo_client.rs
//! Veo reference-to-video generation through the Gemini API long-running
//! operation endpoints.

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use base64::prelude::*;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::gemini_client::DEFAULT_BASE_URL;
use crate::services::{ObjectStore, ServiceError, ServiceResult, VideoGenerationRequest, VideoGenerator};

const OUTPUT_FOLDER: &str = "retro_games_videos";

#[derive(Clone)]
pub struct VeoClient {
    client: Client,
    api_key: String,
    base_url: String,
    storage: Arc<dyn ObjectStore>,
    poll_interval: Duration,
    max_wait: Duration,
}

#[derive(Debug, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    pub error: Option<OperationError>,
    pub response: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct OperationError {
    pub code: Option<i32>,
    pub message: String,
}

impl Operation {
    /// Download URIs of the generated samples, in order.
    pub fn video_uris(&self) -> Vec<String> {
        self.response
            .as_ref()
            .and_then(|r| r["generateVideoResponse"]["generatedSamples"].as_array())
            .map(|samples| {
                samples
                    .iter()
                    .filter_map(|s| s["video"]["uri"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Maps the studio's model version labels onto API model names.
/// Anything unrecognised is passed through untouched.
pub fn api_model_name(model_version: &str) -> &str {
    match model_version {
        "2.0" => "veo-2.0-generate-001",
        "3.0" => "veo-3.0-generate-001",
        "3.0-fast" => "veo-3.0-fast-generate-001",
        "3.1" | "veo-3.1-preview" => "veo-3.1-generate-preview",
        "3.1-fast" | "veo-3.1-fast-preview" => "veo-3.1-fast-generate-preview",
        other => other,
    }
}

impl VeoClient {
    pub fn new(api_key: String, storage: Arc<dyn ObjectStore>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            storage,
            poll_interval: Duration::from_secs(10),
            max_wait: Duration::from_secs(600),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_polling(mut self, poll_interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.max_wait = max_wait;
        self
    }

    async fn build_body(&self, request: &VideoGenerationRequest) -> ServiceResult<Value> {
        let mut references = Vec::with_capacity(request.reference_images.len());
        for image in &request.reference_images {
            let bytes = self.storage.download(&image.uri).await?;
            references.push(json!({
                "image": {
                    "bytesBase64Encoded": BASE64_STANDARD.encode(bytes),
                    "mimeType": image.mime_type,
                },
                "referenceType": "asset",
            }));
        }

        Ok(json!({
            "instances": [{
                "prompt": request.prompt,
                "referenceImages": references,
            }],
            "parameters": {
                "aspectRatio": request.aspect_ratio,
                "durationSeconds": request.duration_seconds,
                "resolution": request.resolution,
                "sampleCount": request.sample_count,
                "enhancePrompt": request.enhance_prompt,
                "personGeneration": request.person_generation,
            }
        }))
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> ServiceResult<Value> {
        let response = request.header("x-goog-api-key", &self.api_key).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ServiceError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn fetch_operation(&self, name: &str) -> ServiceResult<Operation> {
        let url = format!("{}/{}", self.base_url, name);
        let value = self.send_json(self.client.get(&url)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Polls until the operation reports `done`, backing off between polls.
    async fn wait_for_operation(&self, name: &str) -> ServiceResult<Operation> {
        let policy = ExponentialBackoff {
            initial_interval: self.poll_interval,
            max_interval: self.poll_interval * 3,
            multiplier: 1.5,
            max_elapsed_time: Some(self.max_wait),
            ..Default::default()
        };

        let this = self;
        retry(policy, || async move {
            let operation = this
                .fetch_operation(name)
                .await
                .map_err(backoff::Error::permanent)?;
            if operation.done {
                Ok(operation)
            } else {
                tracing::debug!(operation = %name, "Veo operation still running");
                Err(backoff::Error::transient(ServiceError::Timeout(format!(
                    "Veo operation {} did not finish",
                    name
                ))))
            }
        })
        .await
    }

    async fn download_video(&self, uri: &str) -> ServiceResult<Vec<u8>> {
        let response = self
            .client
            .get(uri)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Api {
                status: status.as_u16(),
                body: response.text().await?,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl VideoGenerator for VeoClient {
    async fn generate_video(&self, request: VideoGenerationRequest) -> ServiceResult<Vec<String>> {
        let model = api_model_name(&request.model_version);
        let url = format!("{}/models/{}:predictLongRunning", self.base_url, model);
        let body = self.build_body(&request).await?;

        tracing::info!(model = %model, references = request.reference_images.len(), duration = request.duration_seconds, "Submitting Veo request");
        let submitted = self.send_json(self.client.post(&url).json(&body)).await?;
        let name = submitted["name"]
            .as_str()
            .ok_or_else(|| ServiceError::InvalidRequest(format!("Veo response without operation name: {}", submitted)))?
            .to_string();

        let operation = self.wait_for_operation(&name).await?;
        if let Some(error) = &operation.error {
            return Err(ServiceError::Api {
                status: operation_error_status(error.code),
                body: error.message.clone(),
            });
        }

        let mut stored = Vec::new();
        for video_uri in operation.video_uris() {
            let bytes = self.download_video(&video_uri).await?;
            let filename = format!("video_{}.mp4", Uuid::new_v4());
            stored.push(self.storage.store(OUTPUT_FOLDER, &filename, "video/mp4", bytes).await?);
        }
        tracing::info!(operation = %name, videos = stored.len(), "Veo operation finished");
        Ok(stored)
    }
}

/// Operation error codes outside the HTTP range are reported as 500.
fn operation_error_status(code: Option<i32>) -> u16 {
    code.and_then(|code| u16::try_from(code).ok()).unwrap_or(500)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name_mapping() {
        assert_eq!(api_model_name("veo-3.1-preview"), "veo-3.1-generate-preview");
        assert_eq!(api_model_name("3.0-fast"), "veo-3.0-fast-generate-001");
        assert_eq!(api_model_name("veo-3.0-generate-001"), "veo-3.0-generate-001");
    }

    #[test]
    fn test_operation_video_uris() {
        let raw = r#"{
            "name": "models/veo-3.1-generate-preview/operations/abc",
            "done": true,
            "response": {
                "generateVideoResponse": {
                    "generatedSamples": [
                        {"video": {"uri": "https://example.com/v1:download?alt=media"}}
                    ]
                }
            }
        }"#;
        let operation: Operation = serde_json::from_str(raw).unwrap();
        assert!(operation.done);
        assert_eq!(operation.video_uris(), vec!["https://example.com/v1:download?alt=media".to_string()]);
    }

    #[test]
    fn test_operation_error_status() {
        assert_eq!(operation_error_status(Some(429)), 429);
        assert_eq!(operation_error_status(None), 500);
        assert_eq!(operation_error_status(Some(-1)), 500);
        assert_eq!(operation_error_status(Some(70_000)), 500);
    }

    #[test]
    fn test_pending_operation_has_no_videos() {
        let operation: Operation = serde_json::from_str(r#"{"name": "operations/xyz"}"#).unwrap();
        assert!(!operation.done);
        assert!(operation.video_uris().is_empty());
    }
}
