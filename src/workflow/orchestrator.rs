// src/workflow/orchestrator.rs
//! Drives the four steps for one request, reports progress to an observer
//! and records the finished video in the media library.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info};

use super::config::RetroGameConfig;
use super::error::WorkflowError;
use super::state::{IntermediateAssets, RetroGameWorkflowState, WorkflowOptions};
use super::steps::{
    initialize_workflow, resume_from_assets, step_1_generate_8bit, step_2_generate_character_sheet,
    step_3_generate_video, step_4_append_bumper, validate_inputs, StepContext,
};
use crate::models::media_item::MediaItem;
use crate::services::GenerationServices;

pub const STEP_INITIALIZING: &str = "Initializing...";
pub const STEP_EIGHT_BIT: &str = "Generating 8-bit images...";
pub const STEP_CHARACTER_SHEETS: &str = "Generating character sheets...";
pub const STEP_VIDEO: &str = "Generating video (this may take a minute)...";
pub const STEP_FINALIZING: &str = "Finalizing video...";
pub const STEP_REGENERATING: &str = "Regenerating Video...";
pub const STEP_COMPLETE: &str = "Complete!";
pub const STEP_FAILED: &str = "Failed";

/// Everything a user submits to start a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetroGameRequest {
    pub user_email: String,
    pub theme: String,
    pub player1_image_uri: String,
    #[serde(default)]
    pub player2_image_uri: Option<String>,
    #[serde(flatten)]
    pub options: WorkflowOptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A step is about to run; `message` is the user-facing label.
    StepStarted { message: String },
    /// A step returned; carries the state it produced.
    StepFinished { state: Box<RetroGameWorkflowState> },
    Finished {
        current_step: String,
        error_message: Option<String>,
    },
}

/// Receives progress from a running workflow.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

impl ProgressObserver for mpsc::UnboundedSender<ProgressEvent> {
    fn on_event(&self, event: ProgressEvent) {
        if self.send(event).is_err() {
            tracing::debug!("Progress receiver dropped, event discarded");
        }
    }
}

pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Last state the pipeline produced. `None` when validation failed.
    pub state: Option<RetroGameWorkflowState>,
    pub current_step: String,
    pub error_message: Option<String>,
    pub elapsed_seconds: f64,
    pub total_duration: Option<String>,
    pub media_item_id: Option<String>,
}

impl RunOutcome {
    pub fn is_complete(&self) -> bool {
        self.current_step == STEP_COMPLETE
    }
}

pub struct RetroGameOrchestrator {
    config: Arc<RetroGameConfig>,
    services: GenerationServices,
}

impl RetroGameOrchestrator {
    pub fn new(config: Arc<RetroGameConfig>, services: GenerationServices) -> Self {
        Self { config, services }
    }

    pub fn config(&self) -> &RetroGameConfig {
        &self.config
    }

    /// Rejects requests that could never succeed, before any model is called.
    pub fn validate(&self, request: &RetroGameRequest) -> Result<(), WorkflowError> {
        validate_inputs(&request.player1_image_uri, &request.options)?;
        if self.config.get_theme_config(&request.theme).is_none() {
            return Err(WorkflowError::ThemeNotFound(request.theme.clone()));
        }
        Ok(())
    }

    /// Runs the whole pipeline: 8-bit sprites, character sheets, video, bumper.
    pub async fn run(&self, request: RetroGameRequest, observer: &dyn ProgressObserver) -> RunOutcome {
        let started = Instant::now();
        observer.on_event(ProgressEvent::StepStarted {
            message: STEP_INITIALIZING.to_string(),
        });

        let state = match initialize_workflow(
            &request.user_email,
            &request.theme,
            &request.player1_image_uri,
            request.player2_image_uri.as_deref(),
            request.options,
        ) {
            Ok(state) => state,
            Err(e) => return self.rejected(e.to_string(), started, observer),
        };

        info!(workflow_id = %state.workflow_id, user = %state.user_email, "🕹️ Starting retro game workflow");
        let ctx = StepContext::new(&self.config, &self.services);

        observer.on_event(ProgressEvent::StepStarted {
            message: STEP_EIGHT_BIT.to_string(),
        });
        let state = step_1_generate_8bit(state, &ctx).await;
        if !self.step_finished(&state, observer) {
            return self.finish(state, started, "Total time", observer).await;
        }

        observer.on_event(ProgressEvent::StepStarted {
            message: STEP_CHARACTER_SHEETS.to_string(),
        });
        let state = step_2_generate_character_sheet(state, &ctx).await;
        if !self.step_finished(&state, observer) {
            return self.finish(state, started, "Total time", observer).await;
        }

        let state = self.run_video_steps(state, &ctx, observer).await;
        self.finish(state, started, "Total time", observer).await
    }

    /// Re-runs steps 3 and 4 on sprites and sheets from an earlier run.
    pub async fn regenerate_video(
        &self,
        request: RetroGameRequest,
        assets: &IntermediateAssets,
        observer: &dyn ProgressObserver,
    ) -> RunOutcome {
        let started = Instant::now();
        observer.on_event(ProgressEvent::StepStarted {
            message: STEP_REGENERATING.to_string(),
        });

        let state = match resume_from_assets(
            &request.user_email,
            &request.theme,
            &request.player1_image_uri,
            request.player2_image_uri.as_deref(),
            assets,
            request.options,
        ) {
            Ok(state) => state,
            Err(e) => return self.rejected(e.to_string(), started, observer),
        };

        info!(workflow_id = %state.workflow_id, user = %state.user_email, "🔁 Regenerating retro game video");
        let ctx = StepContext::new(&self.config, &self.services);
        let state = self.run_video_steps(state, &ctx, observer).await;
        self.finish(state, started, "Regeneration time", observer).await
    }

    async fn run_video_steps(
        &self,
        state: RetroGameWorkflowState,
        ctx: &StepContext<'_>,
        observer: &dyn ProgressObserver,
    ) -> RetroGameWorkflowState {
        observer.on_event(ProgressEvent::StepStarted {
            message: STEP_VIDEO.to_string(),
        });
        let state = step_3_generate_video(state, ctx).await;
        if !self.step_finished(&state, observer) {
            return state;
        }

        observer.on_event(ProgressEvent::StepStarted {
            message: STEP_FINALIZING.to_string(),
        });
        let state = step_4_append_bumper(state, ctx).await;
        self.step_finished(&state, observer);
        state
    }

    /// Publishes the snapshot and reports whether the pipeline may continue.
    fn step_finished(&self, state: &RetroGameWorkflowState, observer: &dyn ProgressObserver) -> bool {
        observer.on_event(ProgressEvent::StepFinished {
            state: Box::new(state.clone()),
        });
        !state.is_failed()
    }

    fn rejected(&self, message: String, started: Instant, observer: &dyn ProgressObserver) -> RunOutcome {
        tracing::warn!("Retro game request rejected: {}", message);
        observer.on_event(ProgressEvent::Finished {
            current_step: STEP_FAILED.to_string(),
            error_message: Some(message.clone()),
        });
        RunOutcome {
            state: None,
            current_step: STEP_FAILED.to_string(),
            error_message: Some(message),
            elapsed_seconds: started.elapsed().as_secs_f64(),
            total_duration: None,
            media_item_id: None,
        }
    }

    async fn finish(
        &self,
        state: RetroGameWorkflowState,
        started: Instant,
        duration_label: &str,
        observer: &dyn ProgressObserver,
    ) -> RunOutcome {
        let elapsed = started.elapsed();

        let outcome = if state.is_failed() || state.final_video_uri.is_none() {
            let message = state
                .error_message
                .clone()
                .unwrap_or_else(|| "Workflow finished without a video.".to_string());
            RunOutcome {
                state: Some(state),
                current_step: STEP_FAILED.to_string(),
                error_message: Some(message),
                elapsed_seconds: elapsed.as_secs_f64(),
                total_duration: None,
                media_item_id: None,
            }
        } else {
            let media_item_id = self.persist(&state, elapsed.as_secs_f64()).await;
            info!(
                workflow_id = %state.workflow_id,
                video = ?state.final_video_uri,
                seconds = elapsed.as_secs(),
                "✅ Retro game workflow complete"
            );
            RunOutcome {
                state: Some(state),
                current_step: STEP_COMPLETE.to_string(),
                error_message: None,
                elapsed_seconds: elapsed.as_secs_f64(),
                total_duration: Some(format!("{}: {} seconds", duration_label, elapsed.as_secs())),
                media_item_id,
            }
        };

        observer.on_event(ProgressEvent::Finished {
            current_step: outcome.current_step.clone(),
            error_message: outcome.error_message.clone(),
        });
        outcome
    }

    /// Best effort: a failed write is logged and the run still counts as complete.
    async fn persist(&self, state: &RetroGameWorkflowState, generation_time: f64) -> Option<String> {
        let item = self.build_media_item(state, generation_time);
        match self.services.media.add_media_item(item).await {
            Ok(id) => {
                info!(workflow_id = %state.workflow_id, media_item_id = %id, "Media item saved");
                Some(id)
            }
            Err(e) => {
                error!(workflow_id = %state.workflow_id, "Error saving media item: {}", e);
                None
            }
        }
    }

    pub fn build_media_item(&self, state: &RetroGameWorkflowState, generation_time: f64) -> MediaItem {
        let theme_logo = self.config.get_theme_8bit_logo(&state.theme).map(str::to_string);
        let r2v_reference_images: Vec<String> = [
            &state.player1_8bit_uri,
            &state.player1_sheet_uri,
            &state.player2_8bit_uri,
            &state.player2_sheet_uri,
            &theme_logo,
        ]
        .into_iter()
        .flatten()
        .filter(|uri| !uri.is_empty())
        .cloned()
        .collect();

        let mut source_uris: Vec<String> = std::iter::once(state.player1_image_uri.clone())
            .chain(state.player2_image_uri.clone())
            .chain(state.bumper_uri.clone())
            .filter(|uri| !uri.is_empty())
            .collect();
        source_uris.dedup();

        let final_uri = state.final_video_uri.clone().unwrap_or_default();
        MediaItem {
            id: None,
            user_email: state.user_email.clone(),
            timestamp: Utc::now(),
            media_type: "video".to_string(),
            mime_type: "video/mp4".to_string(),
            gcs_uris: vec![final_uri.clone()],
            gcs_uri: final_uri,
            prompt: state.scene_direction.clone(),
            model: state.options.model_version.clone(),
            duration: f64::from(state.options.duration_seconds),
            generation_time,
            comment: Some(format!("Retro Game Workflow ({} Theme)", state.theme)),
            mode: "r2v".to_string(),
            r2v_reference_images,
            source_uris,
        }
    }
}
