use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::RecordStore;
use crate::gateway::RecordGateway;
use crate::types::Identity;

/// Shared router state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, config: AppConfig) -> Self {
        Self { store, config: Arc::new(config) }
    }

    /// Gateway acting on behalf of `identity` for one request
    pub fn gateway<'a>(&'a self, identity: &'a Identity) -> RecordGateway<'a> {
        RecordGateway::new(self.store.as_ref(), &self.config, identity)
    }
}
