use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use magpie::agent::Agent;
use magpie::providers::configs::ProviderConfig;
use magpie::providers::factory;
use magpie::safety::ModelClassifier;
use magpie::store::MemoryStore;
use magpie::workspace::WorkspaceSystem;

use crate::configuration::Settings;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub provider_config: ProviderConfig,
    pub classifier_config: ProviderConfig,
    pub workspace_root: PathBuf,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let workspace_root = PathBuf::from(&settings.workspace.root);
        let (provider_config, classifier_config) = settings.provider.into_configs();

        Self {
            store: Arc::new(MemoryStore::new()),
            provider_config,
            classifier_config,
            workspace_root,
        }
    }

    /// Build a fresh agent wired to the workspace for a single run
    pub fn agent(&self) -> Result<Agent> {
        let provider = factory::get_provider(self.provider_config.clone())?;
        let classifier = factory::get_provider(self.classifier_config.clone())?;

        let system = WorkspaceSystem::new(
            &self.workspace_root,
            Box::new(ModelClassifier::new(classifier)),
        );

        let mut agent = Agent::new(provider);
        agent.add_system(Box::new(system));
        Ok(agent)
    }
}
