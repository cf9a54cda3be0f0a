//! Shared state handed to every route handler.

use std::sync::Arc;

use crate::config::Config;
use crate::services::file_gateway::FileGateway;
use crate::store::TokenStore;

/// Cloned into each request by axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TokenStore>,
    pub gateway: Arc<FileGateway>,
}

impl AppState {
    pub fn new(store: Arc<dyn TokenStore>, config: &Config) -> Self {
        let gateway = Arc::new(FileGateway::new(store.clone(), config));
        Self { store, gateway }
    }
}
