//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::ServerHandle;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Channel + gauges for the session actor
    pub server: ServerHandle,
}

impl AppState {
    pub fn new(config: Arc<Config>, server: ServerHandle) -> Self {
        Self { config, server }
    }
}
