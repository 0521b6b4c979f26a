//! Shared application state

use nearlink_auth::{LinkingManager, SessionRegistry};
use nearlink_core::Config;
use std::sync::Arc;

/// State shared by all request handlers
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Linking operations over the session registry
    pub linking: Arc<LinkingManager>,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config, linking: Arc<LinkingManager>) -> Self {
        Self { config, linking }
    }

    /// Build the state and its linking manager around `registry`
    pub fn from_config(config: Config, registry: Arc<SessionRegistry>) -> Self {
        let linking = Arc::new(LinkingManager::new(
            registry,
            config.rp_id.clone(),
            config.server_url(),
            config.qr_service_url.clone(),
        ));
        Self::new(config, linking)
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.linking.registry()
    }
}
