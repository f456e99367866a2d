// src/workflow/error.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    EightBit,
    CharacterSheet,
    SceneDirection,
    Video,
    Bumper,
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WorkflowStep::EightBit => "Step 1 (8-bit)",
            WorkflowStep::CharacterSheet => "Step 2 (Character Sheets)",
            WorkflowStep::SceneDirection => "Step 3a (Scene Direction)",
            WorkflowStep::Video => "Step 3b (Veo)",
            WorkflowStep::Bumper => "Step 4 (Bumper)",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("Theme '{0}' not found in configuration.")]
    ThemeNotFound(String),
    #[error("8-bit logo for theme '{0}' not found.")]
    LogoNotFound(String),
    #[error("Cannot start {step}: {asset} missing.")]
    MissingAsset { step: WorkflowStep, asset: &'static str },
    #[error("{}", empty_result_message(.step, .player))]
    EmptyResult { step: WorkflowStep, player: Option<u8> },
    #[error("Failed to create composite images for 2-player mode: {0}")]
    Composite(String),
    #[error("Error in {step}: {message}")]
    Remote { step: WorkflowStep, message: String },
}

fn empty_result_message(step: &WorkflowStep, player: &Option<u8>) -> String {
    let what = match step {
        WorkflowStep::EightBit => "8-bit generation",
        WorkflowStep::CharacterSheet => "Character sheet generation",
        WorkflowStep::SceneDirection => "Scene direction generation",
        WorkflowStep::Video => "Video generation",
        WorkflowStep::Bumper => "Bumper concatenation",
    };
    match player {
        Some(player) => format!("{} failed for Player {}", what, player),
        None => format!("{} failed", what),
    }
}
