//! reactgate: library crate.
//!
//! Tracks approval requests posted to chat, turns emoji reactions into
//! approve/reject decisions and forwards them to each application's callback.
//! Re-exports every module so integration tests in `tests/` can drive them.

use std::sync::Arc;

pub mod api;
pub mod authorizer;
pub mod cli;
pub mod config;
pub mod correlator;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod notification;
pub mod redact;
pub mod registry;
pub mod slack;
pub mod store;

use registry::Registry;

/// Shared state passed to handlers.
pub struct AppState {
    pub registry: Arc<Registry>,
}

impl AppState {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}
