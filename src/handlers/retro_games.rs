// src/handlers/retro_games.rs
//! Retro games endpoints - themes, start a run, poll a run, regenerate its video

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::jobs::{RunError, RunId};
use crate::models::retro_games::{ErrorResponse, RunAccepted, RunResponse, ThemeSummary};
use crate::workflow::RetroGameRequest;
use crate::AppState;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

impl IntoResponse for RunError {
    fn into_response(self) -> Response {
        let status = match &self {
            RunError::NotFound(_) => StatusCode::NOT_FOUND,
            RunError::Invalid(_) => StatusCode::BAD_REQUEST,
            RunError::NotReady(_) => StatusCode::CONFLICT,
        };
        error_response(status, self.to_string())
    }
}

/// GET /api/retro-games/themes - Themes in configuration order
pub async fn list_themes(Extension(state): Extension<Arc<AppState>>) -> Json<Vec<ThemeSummary>> {
    Json(state.config.themes().iter().map(ThemeSummary::from).collect())
}

/// POST /api/retro-games/runs - Start the full pipeline in the background
pub async fn create_run(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<RetroGameRequest>,
) -> Response {
    match state.runs.start_run(request).await {
        Ok(run_id) => (StatusCode::ACCEPTED, Json(RunAccepted::new(run_id))).into_response(),
        Err(e) => {
            tracing::warn!("Rejected retro game run: {}", e);
            e.into_response()
        }
    }
}

/// GET /api/retro-games/runs/:run_id - Latest status and assets of a run
pub async fn get_run(Path(run_id): Path<RunId>, Extension(state): Extension<Arc<AppState>>) -> Response {
    match state.runs.get_run(&run_id).await {
        Some(run) => (StatusCode::OK, Json(RunResponse::from(run))).into_response(),
        None => RunError::NotFound(run_id).into_response(),
    }
}

/// POST /api/retro-games/runs/:run_id/regenerate - New video from the run's sprites and sheets
pub async fn regenerate_run(Path(run_id): Path<RunId>, Extension(state): Extension<Arc<AppState>>) -> Response {
    match state.runs.start_regeneration(&run_id).await {
        Ok(new_run_id) => {
            tracing::info!(source_run = %run_id, run_id = %new_run_id, "Video regeneration started");
            (StatusCode::ACCEPTED, Json(RunAccepted::new(new_run_id))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub fn retro_game_routes() -> Router {
    Router::new()
        .route("/api/retro-games/themes", get(list_themes))
        .route("/api/retro-games/runs", post(create_run))
        .route("/api/retro-games/runs/:run_id", get(get_run))
        .route("/api/retro-games/runs/:run_id/regenerate", post(regenerate_run))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::test_app_state;
    use crate::services::testing::FakeServices;
    use crate::workflow::WorkflowOptions;
    use serde_json::Value;
    use std::time::Duration;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(theme: &str) -> RetroGameRequest {
        RetroGameRequest {
            user_email: "player@example.com".to_string(),
            theme: theme.to_string(),
            player1_image_uri: "gs://test/uploads/p1.jpg".to_string(),
            player2_image_uri: None,
            options: WorkflowOptions::default(),
        }
    }

    async fn wait_until_finished(state: &Arc<AppState>, run_id: &str) -> Value {
        for _ in 0..200 {
            let body = body_json(get_run(Path(run_id.to_string()), Extension(state.clone())).await).await;
            if body["status"] == "completed" || body["status"] == "failed" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("run {} did not finish", run_id);
    }

    #[tokio::test]
    async fn test_list_themes_in_order() {
        let fakes = FakeServices::happy();
        let state = test_app_state(&fakes);

        let Json(themes) = list_themes(Extension(state)).await;
        let names: Vec<&str> = themes.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Google", "Dish"]);
        assert_eq!(themes[0].logo_8bit_uri.as_deref(), Some("gs://test/logos/google_8bit.png"));
    }

    #[tokio::test]
    async fn test_create_and_poll_run() {
        let fakes = FakeServices::happy();
        let state = test_app_state(&fakes);

        let response = create_run(Extension(state.clone()), Json(request("Google"))).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let accepted = body_json(response).await;
        let run_id = accepted["run_id"].as_str().unwrap().to_string();
        assert_eq!(accepted["status_url"], format!("/api/retro-games/runs/{}", run_id));

        let run = wait_until_finished(&state, &run_id).await;
        assert_eq!(run["status"], "completed");
        assert_eq!(run["workflow_status"], "complete");
        assert_eq!(run["current_step"], "Complete!");
        assert_eq!(run["assets"]["final_video_uri"], "gs://test/processed_videos/final.mp4");
        assert_eq!(run["assets"]["bumper_uri"], "gs://test/bumpers/google_bumper.mp4");
    }

    #[tokio::test]
    async fn test_create_run_validation_errors() {
        let fakes = FakeServices::happy();
        let state = test_app_state(&fakes);

        let response = create_run(Extension(state.clone()), Json(request("Atari"))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "Theme 'Atari' not found in configuration.");

        let mut blank = request("Google");
        blank.player1_image_uri = String::new();
        let response = create_run(Extension(state), Json(blank)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_run_is_not_found() {
        let fakes = FakeServices::happy();
        let state = test_app_state(&fakes);

        let response = get_run(Path("nope".to_string()), Extension(state.clone())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = regenerate_run(Path("nope".to_string()), Extension(state)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_regenerate_after_early_failure_conflicts() {
        let fakes = FakeServices::happy();
        fakes.images.push(Ok(vec![]));
        let state = test_app_state(&fakes);

        let accepted = body_json(create_run(Extension(state.clone()), Json(request("Google"))).await).await;
        let run_id = accepted["run_id"].as_str().unwrap().to_string();
        let run = wait_until_finished(&state, &run_id).await;
        assert_eq!(run["status"], "failed");
        assert_eq!(run["error_message"], "8-bit generation failed for Player 1");

        let response = regenerate_run(Path(run_id), Extension(state)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["error"], "Cannot regenerate: Missing intermediate assets.");
    }

    #[tokio::test]
    async fn test_regenerate_completed_run() {
        let fakes = FakeServices::happy();
        let state = test_app_state(&fakes);

        let accepted = body_json(create_run(Extension(state.clone()), Json(request("Dish"))).await).await;
        let run_id = accepted["run_id"].as_str().unwrap().to_string();
        wait_until_finished(&state, &run_id).await;

        let response = regenerate_run(Path(run_id.clone()), Extension(state.clone())).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let new_run_id = body_json(response).await["run_id"].as_str().unwrap().to_string();

        let run = wait_until_finished(&state, &new_run_id).await;
        assert_eq!(run["kind"], "regenerate_video");
        assert_eq!(run["regenerated_from"], run_id.as_str());
        assert_eq!(run["status"], "completed");
    }
}
