// src/handlers/mod.rs
pub mod retro_games; // 🕹️ Retro games workflow runs
pub mod status;

#[cfg(test)]
pub mod testing {
    use std::sync::Arc;

    use crate::jobs::RunManager;
    use crate::services::testing::{FakeServices, TEST_CONFIG_JSON, TEST_PROMPTS_JSON};
    use crate::settings::Settings;
    use crate::workflow::{RetroGameConfig, RetroGameOrchestrator};
    use crate::AppState;

    pub fn test_app_state(fakes: &FakeServices) -> Arc<AppState> {
        let config = Arc::new(RetroGameConfig::from_json_str(TEST_CONFIG_JSON, TEST_PROMPTS_JSON).unwrap());
        let orchestrator = Arc::new(RetroGameOrchestrator::new(config.clone(), fakes.services()));
        Arc::new(AppState {
            config,
            runs: Arc::new(RunManager::new(orchestrator)),
            db_pool: None,
            settings: Settings::from_lookup(|_| None),
        })
    }
}
