// src/models/retro_games.rs
use serde::{Deserialize, Serialize};

use crate::jobs::{RunKind, RunRecord, RunStatus};
use crate::workflow::config::ThemeConfig;
use crate::workflow::{RetroGameWorkflowState, WorkflowStatus};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ThemeSummary {
    pub name: String,
    pub logo_uri: Option<String>,
    pub logo_8bit_uri: Option<String>,
}

impl From<&ThemeConfig> for ThemeSummary {
    fn from(theme: &ThemeConfig) -> Self {
        Self {
            name: theme.name.clone(),
            logo_uri: theme.logo_uri.clone(),
            logo_8bit_uri: theme.logo_8bit_uri.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunAccepted {
    pub run_id: String,
    pub status_url: String,
}

impl RunAccepted {
    pub fn new(run_id: String) -> Self {
        Self {
            status_url: format!("/api/retro-games/runs/{}", run_id),
            run_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Asset URIs produced so far.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RunAssets {
    pub player1_8bit_uri: Option<String>,
    pub player2_8bit_uri: Option<String>,
    pub player1_sheet_uri: Option<String>,
    pub player2_sheet_uri: Option<String>,
    pub scene_direction: Option<String>,
    pub raw_video_uri: Option<String>,
    pub bumper_uri: Option<String>,
    pub final_video_uri: Option<String>,
}

impl From<&RetroGameWorkflowState> for RunAssets {
    fn from(state: &RetroGameWorkflowState) -> Self {
        Self {
            player1_8bit_uri: state.player1_8bit_uri.clone(),
            player2_8bit_uri: state.player2_8bit_uri.clone(),
            player1_sheet_uri: state.player1_sheet_uri.clone(),
            player2_sheet_uri: state.player2_sheet_uri.clone(),
            scene_direction: state.scene_direction.clone(),
            raw_video_uri: state.raw_video_uri.clone(),
            bumper_uri: state.bumper_uri.clone(),
            final_video_uri: state.final_video_uri.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run_id: String,
    pub kind: RunKind,
    pub theme: String,
    pub regenerated_from: Option<String>,
    #[serde(flatten)]
    pub status: RunStatus,
    pub current_step: String,
    pub workflow_status: Option<WorkflowStatus>,
    pub error_message: Option<String>,
    pub assets: RunAssets,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl From<RunRecord> for RunResponse {
    fn from(run: RunRecord) -> Self {
        let assets = run.state.as_ref().map(RunAssets::from).unwrap_or_default();
        let error_message = match &run.status {
            RunStatus::Failed { error, .. } => Some(error.clone()),
            _ => run.state.as_ref().and_then(|s| s.error_message.clone()),
        };
        Self {
            run_id: run.id,
            kind: run.kind,
            theme: run.request.theme,
            regenerated_from: run.regenerated_from,
            workflow_status: run.state.as_ref().map(|s| s.status),
            status: run.status,
            current_step: run.current_step,
            error_message,
            assets,
            created_at: run.created_at.to_rfc3339(),
            completed_at: run.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}
