// src/jobs/mod.rs
//! Background runs of the retro games workflow.
//! Each run executes on its own tokio task; progress flows back over an
//! unbounded channel so the HTTP layer can poll the latest snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::workflow::{
    IntermediateAssets, ProgressEvent, RetroGameOrchestrator, RetroGameRequest, RetroGameWorkflowState,
    RunOutcome,
};

/// Unique identifier for a background run
pub type RunId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunStatus {
    /// Accepted, task not started yet
    Queued,
    Running {
        current_step: String,
    },
    Completed {
        final_video_uri: String,
        total_duration: Option<String>,
        media_item_id: Option<String>,
    },
    Failed {
        error: String,
        failed_at_step: String,
    },
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunStatus::Completed { .. } | RunStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Full,
    RegenerateVideo,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: RunId,
    pub kind: RunKind,
    pub request: RetroGameRequest,
    pub regenerated_from: Option<RunId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    /// Latest user-facing progress label.
    pub current_step: String,
    /// Latest workflow snapshot.
    pub state: Option<RetroGameWorkflowState>,
}

impl RunRecord {
    fn new(kind: RunKind, request: RetroGameRequest, regenerated_from: Option<RunId>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            request,
            regenerated_from,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            status: RunStatus::Queued,
            current_step: String::new(),
            state: None,
        }
    }

    /// Sprites and sheets of this run, if it got that far.
    pub fn intermediate_assets(&self) -> Option<IntermediateAssets> {
        let assets = self.state.as_ref()?.intermediate_assets();
        assets.has_player1().then_some(assets)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum RunError {
    #[error("Run {0} not found")]
    NotFound(RunId),
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    NotReady(String),
}

pub struct RunManager {
    runs: Arc<RwLock<HashMap<RunId, RunRecord>>>,
    orchestrator: Arc<RetroGameOrchestrator>,
}

impl RunManager {
    pub fn new(orchestrator: Arc<RetroGameOrchestrator>) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &RetroGameOrchestrator {
        &self.orchestrator
    }

    /// Validates the request, records it and starts the full pipeline in the background.
    pub async fn start_run(&self, request: RetroGameRequest) -> Result<RunId, RunError> {
        self.orchestrator
            .validate(&request)
            .map_err(|e| RunError::Invalid(e.to_string()))?;

        let record = RunRecord::new(RunKind::Full, request, None);
        Ok(self.spawn(record, None).await)
    }

    /// Starts a "regenerate video only" run from a finished run's sprites and sheets.
    pub async fn start_regeneration(&self, source_run_id: &str) -> Result<RunId, RunError> {
        let source = self
            .get_run(source_run_id)
            .await
            .ok_or_else(|| RunError::NotFound(source_run_id.to_string()))?;

        if !source.status.is_finished() {
            return Err(RunError::NotReady(format!("Run {} is still in progress", source_run_id)));
        }
        let assets = source
            .intermediate_assets()
            .ok_or_else(|| RunError::NotReady("Cannot regenerate: Missing intermediate assets.".to_string()))?;

        let record = RunRecord::new(
            RunKind::RegenerateVideo,
            source.request.clone(),
            Some(source.id.clone()),
        );
        Ok(self.spawn(record, Some(assets)).await)
    }

    pub async fn get_run(&self, run_id: &str) -> Option<RunRecord> {
        let runs = self.runs.read().await;
        runs.get(run_id).cloned()
    }

    async fn spawn(&self, record: RunRecord, assets: Option<IntermediateAssets>) -> RunId {
        let run_id = record.id.clone();
        let request = record.request.clone();
        self.runs.write().await.insert(run_id.clone(), record);
        tracing::info!(run_id = %run_id, regenerate = assets.is_some(), "🎬 Created run");

        let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();

        let runs = self.runs.clone();
        let listener_id = run_id.clone();
        let listener = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                apply_event(&runs, &listener_id, event).await;
            }
        });

        let runs = self.runs.clone();
        let orchestrator = self.orchestrator.clone();
        let task_id = run_id.clone();
        tokio::spawn(async move {
            let outcome = match assets {
                Some(assets) => orchestrator.regenerate_video(request, &assets, &tx).await,
                None => orchestrator.run(request, &tx).await,
            };
            // Let the listener drain before writing the final status.
            drop(tx);
            if let Err(e) = listener.await {
                tracing::warn!(run_id = %task_id, "Progress listener failed: {}", e);
            }
            apply_outcome(&runs, &task_id, outcome).await;
        });

        run_id
    }

    /// Drops finished runs older than `max_age_hours`.
    pub async fn cleanup_old_runs(&self, max_age_hours: i64) {
        let mut runs = self.runs.write().await;
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours);
        let before = runs.len();
        runs.retain(|_, run| run.completed_at.map_or(true, |completed_at| completed_at >= cutoff));
        let removed = before - runs.len();
        if removed > 0 {
            tracing::debug!("🗑️ Cleaned up {} old runs", removed);
        }
    }
}

async fn apply_event(runs: &RwLock<HashMap<RunId, RunRecord>>, run_id: &str, event: ProgressEvent) {
    let mut runs = runs.write().await;
    let Some(run) = runs.get_mut(run_id) else {
        return;
    };
    match event {
        ProgressEvent::StepStarted { message } => {
            if run.started_at.is_none() {
                run.started_at = Some(Utc::now());
            }
            tracing::debug!(run_id = %run_id, "📊 {}", message);
            run.status = RunStatus::Running {
                current_step: message.clone(),
            };
            run.current_step = message;
        }
        ProgressEvent::StepFinished { state } => run.state = Some(*state),
        ProgressEvent::Finished { .. } => {}
    }
}

async fn apply_outcome(runs: &RwLock<HashMap<RunId, RunRecord>>, run_id: &str, outcome: RunOutcome) {
    let mut runs = runs.write().await;
    let Some(run) = runs.get_mut(run_id) else {
        return;
    };

    let failed_at_step = std::mem::replace(&mut run.current_step, outcome.current_step.clone());
    let final_video_uri = outcome
        .state
        .as_ref()
        .and_then(|state| state.final_video_uri.clone());

    run.status = match (outcome.is_complete(), final_video_uri) {
        (true, Some(final_video_uri)) => RunStatus::Completed {
            final_video_uri,
            total_duration: outcome.total_duration,
            media_item_id: outcome.media_item_id,
        },
        _ => RunStatus::Failed {
            error: outcome.error_message.unwrap_or_else(|| "Unknown error".to_string()),
            failed_at_step,
        },
    };
    if outcome.state.is_some() {
        run.state = outcome.state;
    }
    run.completed_at = Some(Utc::now());
    tracing::info!(run_id = %run_id, status = ?run.status, "🏁 Run finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{FakeServices, FakeVideoGenerator, TEST_CONFIG_JSON, TEST_PROMPTS_JSON};
    use crate::workflow::{RetroGameConfig, WorkflowOptions};
    use std::time::Duration;

    fn manager(fakes: &FakeServices) -> RunManager {
        let config = Arc::new(RetroGameConfig::from_json_str(TEST_CONFIG_JSON, TEST_PROMPTS_JSON).unwrap());
        RunManager::new(Arc::new(RetroGameOrchestrator::new(config, fakes.services())))
    }

    fn request() -> RetroGameRequest {
        RetroGameRequest {
            user_email: "player@example.com".to_string(),
            theme: "Dish".to_string(),
            player1_image_uri: "gs://test/uploads/p1.jpg".to_string(),
            player2_image_uri: None,
            options: WorkflowOptions::default(),
        }
    }

    async fn wait_for_finish(manager: &RunManager, run_id: &str) -> RunRecord {
        for _ in 0..200 {
            let run = manager.get_run(run_id).await.unwrap();
            if run.status.is_finished() {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("run {} did not finish", run_id);
    }

    #[tokio::test]
    async fn test_run_completes_in_background() {
        let fakes = FakeServices::happy();
        let manager = manager(&fakes);

        let run_id = manager.start_run(request()).await.unwrap();
        let run = wait_for_finish(&manager, &run_id).await;

        match &run.status {
            RunStatus::Completed { final_video_uri, total_duration, .. } => {
                assert_eq!(final_video_uri, "gs://test/processed_videos/final.mp4");
                assert!(total_duration.as_deref().unwrap().starts_with("Total time: "));
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert_eq!(run.current_step, "Complete!");
        assert!(run.started_at.is_some() && run.completed_at.is_some());
        assert!(run.intermediate_assets().is_some());
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_up_front() {
        let fakes = FakeServices::happy();
        let manager = manager(&fakes);
        let mut request = request();
        request.player1_image_uri = " ".to_string();

        let err = manager.start_run(request).await.unwrap_err();
        assert_eq!(err, RunError::Invalid("Please select an input image first.".to_string()));
    }

    #[tokio::test]
    async fn test_failed_run_records_step() {
        let fakes = FakeServices::happy().with_video(FakeVideoGenerator::failing("deadline exceeded"));
        let manager = manager(&fakes);

        let run_id = manager.start_run(request()).await.unwrap();
        let run = wait_for_finish(&manager, &run_id).await;

        match &run.status {
            RunStatus::Failed { error, failed_at_step } => {
                assert!(error.starts_with("Error in Step 3b (Veo):"));
                assert_eq!(failed_at_step.as_str(), "Generating video (this may take a minute)...");
            }
            other => panic!("unexpected status {:?}", other),
        }
        // Sprites and sheets survive, so the video can be regenerated.
        assert!(run.intermediate_assets().is_some());
    }

    #[tokio::test]
    async fn test_regeneration_reuses_source_run() {
        let fakes = FakeServices::happy();
        let manager = manager(&fakes);

        let first = manager.start_run(request()).await.unwrap();
        let source = wait_for_finish(&manager, &first).await;
        let image_calls = fakes.images.calls().len();

        let second = manager.start_regeneration(&first).await.unwrap();
        let run = wait_for_finish(&manager, &second).await;

        assert_eq!(run.kind, RunKind::RegenerateVideo);
        assert_eq!(run.regenerated_from.as_deref(), Some(first.as_str()));
        assert!(matches!(run.status, RunStatus::Completed { .. }));
        assert_eq!(fakes.images.calls().len(), image_calls);
        assert_eq!(
            run.state.unwrap().player1_8bit_uri,
            source.state.unwrap().player1_8bit_uri
        );
    }

    #[tokio::test]
    async fn test_regeneration_of_unknown_run() {
        let fakes = FakeServices::happy();
        let manager = manager(&fakes);
        assert_eq!(
            manager.start_regeneration("missing").await.unwrap_err(),
            RunError::NotFound("missing".to_string())
        );
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_runs() {
        let fakes = FakeServices::happy();
        let manager = manager(&fakes);
        let run_id = manager.start_run(request()).await.unwrap();
        wait_for_finish(&manager, &run_id).await;

        manager.cleanup_old_runs(1).await;
        assert!(manager.get_run(&run_id).await.is_some());

        manager.cleanup_old_runs(-1).await;
        assert!(manager.get_run(&run_id).await.is_none());
    }
}
