// src/workflow/steps.rs
//! The four pipeline steps.
//!
//! Every step takes the state by value and hands it back. A state already in
//! `error` is returned untouched, so the orchestrator can chain the steps
//! without checking in between. Steps never report progress themselves.

use tracing::{info, warn};
use uuid::Uuid;

use super::composite::create_composite_image;
use super::config::{
    render_template, RetroGameConfig, CHARACTER_SHEET_PROMPT, EIGHT_BIT_PROMPT, SCENE_DIRECTION_PROMPT,
};
use super::error::{WorkflowError, WorkflowStep};
use super::state::{non_empty, IntermediateAssets, RetroGameWorkflowState, WorkflowOptions, WorkflowStatus};
use crate::services::{
    GenerationServices, ImageGenerationRequest, ReferenceImage, Transition, VideoGenerationRequest,
};

const SPRITE_ASPECT_RATIO: &str = "1:1";
const VIDEO_ASPECT_RATIO: &str = "16:9";
const VIDEO_RESOLUTION: &str = "720p";

/// What a step may read: the shared configuration and the collaborators.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub config: &'a RetroGameConfig,
    pub services: &'a GenerationServices,
}

impl<'a> StepContext<'a> {
    pub fn new(config: &'a RetroGameConfig, services: &'a GenerationServices) -> Self {
        Self { config, services }
    }
}

fn validate_options(options: &WorkflowOptions) -> Result<(), WorkflowError> {
    if options.duration_seconds == 0 {
        return Err(WorkflowError::Validation("Video duration must be at least one second.".to_string()));
    }
    if options.scene_count == 0 {
        return Err(WorkflowError::Validation("Scene count must be at least one.".to_string()));
    }
    Ok(())
}

fn blank_state(
    user_email: &str,
    theme: &str,
    player1_image_uri: &str,
    player2_image_uri: Option<&str>,
    options: WorkflowOptions,
) -> RetroGameWorkflowState {
    RetroGameWorkflowState {
        workflow_id: Uuid::new_v4().to_string(),
        user_email: user_email.to_string(),
        theme: theme.to_string(),
        status: WorkflowStatus::Created,
        error_message: None,
        player1_image_uri: player1_image_uri.trim().to_string(),
        player2_image_uri: player2_image_uri
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
            .map(str::to_string),
        options,
        player1_8bit_uri: None,
        player2_8bit_uri: None,
        player1_sheet_uri: None,
        player2_sheet_uri: None,
        scene_direction: None,
        raw_video_uri: None,
        bumper_uri: None,
        final_video_uri: None,
    }
}

/// Checks the user inputs a full run starts from.
pub fn validate_inputs(player1_image_uri: &str, options: &WorkflowOptions) -> Result<(), WorkflowError> {
    if player1_image_uri.trim().is_empty() {
        return Err(WorkflowError::Validation("Please select an input image first.".to_string()));
    }
    validate_options(options)
}

/// Creates a fresh state for a full run.
pub fn initialize_workflow(
    user_email: &str,
    theme: &str,
    player1_image_uri: &str,
    player2_image_uri: Option<&str>,
    options: WorkflowOptions,
) -> Result<RetroGameWorkflowState, WorkflowError> {
    validate_inputs(player1_image_uri, &options)?;

    let state = blank_state(user_email, theme, player1_image_uri, player2_image_uri, options);
    info!(
        workflow_id = %state.workflow_id,
        theme = %state.theme,
        two_player = state.is_two_player(),
        "Workflow initialized"
    );
    Ok(state)
}

/// Creates a state that already holds the step 1 and 2 outputs, ready for
/// step 3. Used by the "regenerate video only" path.
pub fn resume_from_assets(
    user_email: &str,
    theme: &str,
    player1_image_uri: &str,
    player2_image_uri: Option<&str>,
    assets: &IntermediateAssets,
    options: WorkflowOptions,
) -> Result<RetroGameWorkflowState, WorkflowError> {
    if !assets.has_player1() {
        return Err(WorkflowError::Validation(
            "Cannot regenerate: Missing intermediate assets.".to_string(),
        ));
    }
    validate_options(&options)?;

    let mut state = blank_state(user_email, theme, player1_image_uri, player2_image_uri, options);
    state.player1_8bit_uri = non_empty(&assets.player1_8bit_uri).map(str::to_string);
    state.player1_sheet_uri = non_empty(&assets.player1_sheet_uri).map(str::to_string);

    match (non_empty(&assets.player2_8bit_uri), non_empty(&assets.player2_sheet_uri)) {
        (Some(sprite), Some(sheet)) => {
            state.player2_8bit_uri = Some(sprite.to_string());
            state.player2_sheet_uri = Some(sheet.to_string());
        }
        (None, None) => state.player2_image_uri = None,
        _ => {
            warn!(workflow_id = %state.workflow_id, "Player 2 assets incomplete, regenerating as single player");
            state.player2_image_uri = None;
        }
    }

    state.status = WorkflowStatus::SheetGenerated;
    info!(workflow_id = %state.workflow_id, theme = %state.theme, "Workflow resumed from intermediate assets");
    Ok(state)
}

/// Runs one image generation and keeps the first returned URI.
async fn generate_single_image(
    ctx: &StepContext<'_>,
    step: WorkflowStep,
    player: u8,
    prompt: &str,
    reference_uri: &str,
    output_folder: &str,
) -> Result<String, WorkflowError> {
    let request = ImageGenerationRequest {
        prompt: prompt.to_string(),
        reference_images: vec![reference_uri.to_string()],
        aspect_ratio: SPRITE_ASPECT_RATIO.to_string(),
        output_folder: output_folder.to_string(),
    };
    let uris = ctx
        .services
        .images
        .generate_image(request)
        .await
        .map_err(|e| WorkflowError::Remote {
            step,
            message: e.to_string(),
        })?;
    uris.into_iter()
        .find(|uri| !uri.is_empty())
        .ok_or(WorkflowError::EmptyResult {
            step,
            player: Some(player),
        })
}

pub async fn step_1_generate_8bit(
    mut state: RetroGameWorkflowState,
    ctx: &StepContext<'_>,
) -> RetroGameWorkflowState {
    if state.is_failed() {
        return state;
    }

    let Some(theme_prompt) = ctx.config.get_theme_prompt(&state.theme) else {
        let theme = state.theme.clone();
        state.fail(WorkflowError::ThemeNotFound(theme));
        return state;
    };

    state.status = WorkflowStatus::Generating8Bit;
    let prompt = render_template(
        ctx.config.get_prompt(EIGHT_BIT_PROMPT),
        &[("theme_prompt", theme_prompt)],
    );

    let source = state.player1_image_uri.clone();
    match generate_single_image(ctx, WorkflowStep::EightBit, 1, &prompt, &source, "retro_games_8bit_p1").await {
        Ok(uri) => state.player1_8bit_uri = Some(uri),
        Err(e) => {
            state.fail(e);
            return state;
        }
    }

    if let Some(source) = state.player2_image_uri.clone() {
        match generate_single_image(ctx, WorkflowStep::EightBit, 2, &prompt, &source, "retro_games_8bit_p2").await {
            Ok(uri) => state.player2_8bit_uri = Some(uri),
            Err(e) => {
                state.fail(e);
                return state;
            }
        }
    }

    info!(workflow_id = %state.workflow_id, "8-bit images generated");
    state.status = WorkflowStatus::EightBitGenerated;
    state
}

pub async fn step_2_generate_character_sheet(
    mut state: RetroGameWorkflowState,
    ctx: &StepContext<'_>,
) -> RetroGameWorkflowState {
    if state.is_failed() {
        return state;
    }

    let Some(p1_sprite) = state.player1_8bit_uri.clone() else {
        state.fail(WorkflowError::MissingAsset {
            step: WorkflowStep::CharacterSheet,
            asset: "P1 8-bit image",
        });
        return state;
    };
    let p2_sprite = state.player2_8bit_uri.clone();
    if state.player2_image_uri.is_some() && p2_sprite.is_none() {
        state.fail(WorkflowError::MissingAsset {
            step: WorkflowStep::CharacterSheet,
            asset: "P2 8-bit image",
        });
        return state;
    }

    state.status = WorkflowStatus::GeneratingSheet;
    let prompt = ctx.config.get_prompt(CHARACTER_SHEET_PROMPT).to_string();

    match generate_single_image(
        ctx,
        WorkflowStep::CharacterSheet,
        1,
        &prompt,
        &p1_sprite,
        "retro_games_charsheets_p1",
    )
    .await
    {
        Ok(uri) => state.player1_sheet_uri = Some(uri),
        Err(e) => {
            state.fail(e);
            return state;
        }
    }

    if let Some(p2_sprite) = p2_sprite {
        match generate_single_image(
            ctx,
            WorkflowStep::CharacterSheet,
            2,
            &prompt,
            &p2_sprite,
            "retro_games_charsheets_p2",
        )
        .await
        {
            Ok(uri) => state.player2_sheet_uri = Some(uri),
            Err(e) => {
                state.fail(e);
                return state;
            }
        }
    }

    info!(workflow_id = %state.workflow_id, "Character sheets generated");
    state.status = WorkflowStatus::SheetGenerated;
    state
}

fn scene_direction_prompt(state: &RetroGameWorkflowState, config: &RetroGameConfig) -> String {
    let characters = if state.is_two_player() {
        "these two characters interacting or fighting"
    } else {
        "this character"
    };
    let context = state.options.theme_context.trim();
    let theme_context = if context.is_empty() {
        String::new()
    } else {
        format!(" The scene should be set {}.", context)
    };
    let duration = state.options.duration_seconds.to_string();
    let scene_count = state.options.scene_count.to_string();

    render_template(
        config.get_prompt(SCENE_DIRECTION_PROMPT),
        &[
            ("duration", duration.as_str()),
            ("scene_count", scene_count.as_str()),
            ("characters", characters),
            ("theme_context", theme_context.as_str()),
        ],
    )
}

/// Picks the (at most three) reference images for the video model.
async fn video_references(
    state: &RetroGameWorkflowState,
    ctx: &StepContext<'_>,
    logo: &str,
    p1_sprite: &str,
    p1_sheet: &str,
) -> Result<Vec<ReferenceImage>, WorkflowError> {
    if !state.is_two_player() {
        return Ok(vec![
            ReferenceImage::png(p1_sprite),
            ReferenceImage::png(p1_sheet),
            ReferenceImage::png(logo),
        ]);
    }

    let (Some(p2_sprite), Some(p2_sheet)) = (&state.player2_8bit_uri, &state.player2_sheet_uri) else {
        return Err(WorkflowError::MissingAsset {
            step: WorkflowStep::Video,
            asset: "P2 8-bit image or character sheet",
        });
    };

    let storage = ctx.services.storage.as_ref();
    let p1_composite = create_composite_image(storage, p1_sprite, p1_sheet)
        .await
        .map_err(|e| WorkflowError::Composite(e.to_string()))?;
    let p2_composite = create_composite_image(storage, p2_sprite, p2_sheet)
        .await
        .map_err(|e| WorkflowError::Composite(e.to_string()))?;

    Ok(vec![
        ReferenceImage::png(p1_composite),
        ReferenceImage::png(p2_composite),
        ReferenceImage::png(logo),
    ])
}

pub async fn step_3_generate_video(
    mut state: RetroGameWorkflowState,
    ctx: &StepContext<'_>,
) -> RetroGameWorkflowState {
    if state.is_failed() {
        return state;
    }

    let (Some(p1_sprite), Some(p1_sheet)) = (state.player1_8bit_uri.clone(), state.player1_sheet_uri.clone()) else {
        state.fail(WorkflowError::MissingAsset {
            step: WorkflowStep::Video,
            asset: "P1 8-bit image or character sheet",
        });
        return state;
    };

    // 3a: scene direction
    state.status = WorkflowStatus::GeneratingSceneDirection;
    let prompt = scene_direction_prompt(&state, ctx.config);
    let direction = match ctx.services.text.generate_text(&prompt, &state.eight_bit_uris()).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            state.fail(WorkflowError::EmptyResult {
                step: WorkflowStep::SceneDirection,
                player: None,
            });
            return state;
        }
        Err(e) => {
            state.fail(WorkflowError::Remote {
                step: WorkflowStep::SceneDirection,
                message: e.to_string(),
            });
            return state;
        }
    };
    info!(workflow_id = %state.workflow_id, chars = direction.len(), "Scene direction generated");
    state.scene_direction = Some(direction.clone());

    let Some(logo) = ctx.config.get_theme_8bit_logo(&state.theme).map(str::to_string) else {
        let theme = state.theme.clone();
        state.fail(WorkflowError::LogoNotFound(theme));
        return state;
    };

    // 3b: video
    let reference_images = match video_references(&state, ctx, &logo, &p1_sprite, &p1_sheet).await {
        Ok(references) => references,
        Err(e) => {
            state.fail(e);
            return state;
        }
    };

    state.status = WorkflowStatus::GeneratingVideo;
    let request = VideoGenerationRequest {
        prompt: direction,
        reference_images,
        duration_seconds: state.options.duration_seconds,
        aspect_ratio: VIDEO_ASPECT_RATIO.to_string(),
        resolution: VIDEO_RESOLUTION.to_string(),
        model_version: state.options.model_version.clone(),
        sample_count: 1,
        enhance_prompt: true,
        person_generation: "allow_all".to_string(),
    };

    match ctx.services.video.generate_video(request).await {
        Ok(uris) => match uris.into_iter().find(|uri| !uri.is_empty()) {
            Some(uri) => {
                info!(workflow_id = %state.workflow_id, video = %uri, "Video generated");
                state.raw_video_uri = Some(uri);
                state.status = WorkflowStatus::VideoGenerated;
            }
            None => state.fail(WorkflowError::EmptyResult {
                step: WorkflowStep::Video,
                player: None,
            }),
        },
        Err(e) => state.fail(WorkflowError::Remote {
            step: WorkflowStep::Video,
            message: e.to_string(),
        }),
    }
    state
}

pub async fn step_4_append_bumper(
    mut state: RetroGameWorkflowState,
    ctx: &StepContext<'_>,
) -> RetroGameWorkflowState {
    if state.is_failed() {
        return state;
    }

    let Some(raw_video) = state.raw_video_uri.clone() else {
        state.fail(WorkflowError::MissingAsset {
            step: WorkflowStep::Bumper,
            asset: "raw video",
        });
        return state;
    };

    state.status = WorkflowStatus::Finalizing;

    if !state.options.include_bumper {
        state.final_video_uri = Some(raw_video);
        state.status = WorkflowStatus::Complete;
        return state;
    }

    let Some(bumper) = ctx.config.get_random_bumper().map(str::to_string) else {
        warn!(workflow_id = %state.workflow_id, "No bumper videos configured, skipping bumper");
        state.final_video_uri = Some(raw_video);
        state.status = WorkflowStatus::Complete;
        return state;
    };

    let inputs = [raw_video, bumper.clone()];
    match ctx
        .services
        .video_processor
        .process_videos(&inputs, Transition::Concat)
        .await
    {
        Ok(final_uri) => {
            info!(workflow_id = %state.workflow_id, bumper = %bumper, video = %final_uri, "Bumper appended");
            state.bumper_uri = Some(bumper);
            state.final_video_uri = Some(final_uri);
            state.status = WorkflowStatus::Complete;
        }
        Err(e) => state.fail(WorkflowError::Remote {
            step: WorkflowStep::Bumper,
            message: e.to_string(),
        }),
    }
    state
}
