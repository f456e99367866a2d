// Retro games workflow: four sequential generation steps over a shared state
pub mod composite;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod state;
pub mod steps;

pub use config::RetroGameConfig;
pub use error::{WorkflowError, WorkflowStep};
pub use orchestrator::{
    NoopObserver, ProgressEvent, ProgressObserver, RetroGameOrchestrator, RetroGameRequest, RunOutcome,
};
pub use state::{IntermediateAssets, RetroGameWorkflowState, WorkflowOptions, WorkflowStatus};
