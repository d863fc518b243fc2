//! Shared application state for the API service.

use crate::config::Config;
use crate::voice::registry::SessionRegistry;
use medvoice_core::ToolRegistry;
use std::sync::Arc;

/// Cloned into every handler by axum.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub config: Arc<Config>,
}
