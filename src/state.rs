use crate::broadcast::Hub;
use crate::catalog::ChallengeCatalog;
use crate::config::GameConfig;
use crate::grading::GradingPipeline;
use crate::registry::SessionRegistry;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub registry: SessionRegistry,
    pub hub: Hub,
    pub catalog: Arc<ChallengeCatalog>,
    pub grader: GradingPipeline,
    pub config: GameConfig,
}

impl AppState {
    /// Default rules, built-in catalog, OS-seeded randomness, grading disabled
    pub fn new() -> Self {
        Self::with_config(GameConfig::default(), None, GradingPipeline::disabled())
    }

    pub fn with_config(config: GameConfig, seed: Option<u64>, grader: GradingPipeline) -> Self {
        let catalog = Arc::new(ChallengeCatalog::builtin());
        Self {
            registry: SessionRegistry::new(config.clone(), catalog.clone(), seed),
            hub: Hub::new(),
            catalog,
            grader,
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_state_is_empty() {
        let state = AppState::new();
        assert!(state.registry.is_empty().await);
        assert!(!state.grader.is_available());
        assert_eq!(state.catalog.categories().len(), 5);
    }
}
