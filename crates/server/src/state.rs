use std::sync::Arc;

use magpie_core::credentials::CredentialStore;
use magpie_core::runlog::RunLogStore;
use magpie_core::terms::TermStore;
use magpie_core::{Config, ScraperRegistry, TriggerService};

/// Shared application state
pub struct AppState {
    config: Config,
    trigger: Arc<TriggerService>,
    registry: Arc<ScraperRegistry>,
    run_log_store: Arc<dyn RunLogStore>,
    term_store: Arc<dyn TermStore>,
    credential_store: Arc<dyn CredentialStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        trigger: Arc<TriggerService>,
        registry: Arc<ScraperRegistry>,
        run_log_store: Arc<dyn RunLogStore>,
        term_store: Arc<dyn TermStore>,
        credential_store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            config,
            trigger,
            registry,
            run_log_store,
            term_store,
            credential_store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn trigger(&self) -> &TriggerService {
        &self.trigger
    }

    pub fn registry(&self) -> &ScraperRegistry {
        &self.registry
    }

    pub fn run_log_store(&self) -> &dyn RunLogStore {
        self.run_log_store.as_ref()
    }

    pub fn term_store(&self) -> &dyn TermStore {
        self.term_store.as_ref()
    }

    pub fn credential_store(&self) -> &dyn CredentialStore {
        self.credential_store.as_ref()
    }
}
