// src/workflow/state.rs
//! Per-request record carried through the retro games pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::WorkflowError;

pub const DEFAULT_MODEL_VERSION: &str = "veo-3.1-preview";
pub const DEFAULT_DURATION_SECONDS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Created,
    #[serde(rename = "generating_8bit")]
    Generating8Bit,
    #[serde(rename = "8bit_generated")]
    EightBitGenerated,
    GeneratingSheet,
    SheetGenerated,
    GeneratingSceneDirection,
    GeneratingVideo,
    VideoGenerated,
    Finalizing,
    Complete,
    Error,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Created => "created",
            WorkflowStatus::Generating8Bit => "generating_8bit",
            WorkflowStatus::EightBitGenerated => "8bit_generated",
            WorkflowStatus::GeneratingSheet => "generating_sheet",
            WorkflowStatus::SheetGenerated => "sheet_generated",
            WorkflowStatus::GeneratingSceneDirection => "generating_scene_direction",
            WorkflowStatus::GeneratingVideo => "generating_video",
            WorkflowStatus::VideoGenerated => "video_generated",
            WorkflowStatus::Finalizing => "finalizing",
            WorkflowStatus::Complete => "complete",
            WorkflowStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Complete | WorkflowStatus::Error)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-selected knobs for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowOptions {
    /// Free-form setting for the scene ("on the moon", "in a castle").
    pub theme_context: String,
    pub include_bumper: bool,
    pub model_version: String,
    pub duration_seconds: u32,
    pub scene_count: u32,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            theme_context: String::new(),
            include_bumper: true,
            model_version: DEFAULT_MODEL_VERSION.to_string(),
            duration_seconds: DEFAULT_DURATION_SECONDS,
            scene_count: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetroGameWorkflowState {
    pub workflow_id: String,
    pub user_email: String,
    pub theme: String,
    pub status: WorkflowStatus,
    pub error_message: Option<String>,

    pub player1_image_uri: String,
    pub player2_image_uri: Option<String>,

    pub options: WorkflowOptions,

    // Step 1
    pub player1_8bit_uri: Option<String>,
    pub player2_8bit_uri: Option<String>,

    // Step 2
    pub player1_sheet_uri: Option<String>,
    pub player2_sheet_uri: Option<String>,

    // Step 3
    pub scene_direction: Option<String>,
    pub raw_video_uri: Option<String>,

    // Step 4
    pub bumper_uri: Option<String>,
    pub final_video_uri: Option<String>,
}

impl RetroGameWorkflowState {
    pub fn is_failed(&self) -> bool {
        self.status == WorkflowStatus::Error
    }

    pub fn is_two_player(&self) -> bool {
        self.player2_image_uri.is_some() || self.player2_8bit_uri.is_some()
    }

    /// Moves the state into the absorbing error status.
    pub fn fail(&mut self, error: WorkflowError) {
        tracing::error!(workflow_id = %self.workflow_id, status = %self.status, "Workflow failed: {}", error);
        self.status = WorkflowStatus::Error;
        self.error_message = Some(error.to_string());
    }

    /// The 8-bit sprites generated so far, player 1 first.
    pub fn eight_bit_uris(&self) -> Vec<String> {
        [&self.player1_8bit_uri, &self.player2_8bit_uri]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Intermediate assets the "regenerate video only" path can reuse.
    pub fn intermediate_assets(&self) -> IntermediateAssets {
        IntermediateAssets {
            player1_8bit_uri: self.player1_8bit_uri.clone(),
            player1_sheet_uri: self.player1_sheet_uri.clone(),
            player2_8bit_uri: self.player2_8bit_uri.clone(),
            player2_sheet_uri: self.player2_sheet_uri.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntermediateAssets {
    pub player1_8bit_uri: Option<String>,
    pub player1_sheet_uri: Option<String>,
    pub player2_8bit_uri: Option<String>,
    pub player2_sheet_uri: Option<String>,
}

impl IntermediateAssets {
    pub fn has_player1(&self) -> bool {
        non_empty(&self.player1_8bit_uri).is_some() && non_empty(&self.player1_sheet_uri).is_some()
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&WorkflowStatus::Generating8Bit).unwrap(), "\"generating_8bit\"");
        assert_eq!(serde_json::to_string(&WorkflowStatus::EightBitGenerated).unwrap(), "\"8bit_generated\"");
        assert_eq!(serde_json::to_string(&WorkflowStatus::GeneratingSheet).unwrap(), "\"generating_sheet\"");
        for status in [WorkflowStatus::Created, WorkflowStatus::Finalizing, WorkflowStatus::Complete] {
            assert_eq!(serde_json::to_string(&status).unwrap(), format!("\"{}\"", status));
        }
    }

    #[test]
    fn test_options_defaults_fill_missing_fields() {
        let options: WorkflowOptions = serde_json::from_str(r#"{"theme_context": "on the moon"}"#).unwrap();
        assert_eq!(options.theme_context, "on the moon");
        assert!(options.include_bumper);
        assert_eq!(options.model_version, DEFAULT_MODEL_VERSION);
        assert_eq!(options.duration_seconds, 8);
        assert_eq!(options.scene_count, 1);
    }

    #[test]
    fn test_intermediate_assets_require_player1() {
        let mut assets = IntermediateAssets::default();
        assert!(!assets.has_player1());
        assets.player1_8bit_uri = Some("gs://b/8bit.png".to_string());
        assets.player1_sheet_uri = Some("  ".to_string());
        assert!(!assets.has_player1());
        assets.player1_sheet_uri = Some("gs://b/sheet.png".to_string());
        assert!(assets.has_player1());
    }
}
