//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! cloned into the Slack socket task. It holds the record store, the hub
//! handle, and the event dispatcher. Nothing here is global: `main` builds
//! one instance and hands it to every collaborator.

use std::sync::Arc;

use crate::config::Config;
use crate::services::dispatch::EventDispatcher;
use crate::services::hub::Hub;
use crate::store::RecordStore;

// =============================================================================
// APP STATE
// =============================================================================

/// Clone is required by Axum; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub hub: Hub,
    pub dispatcher: EventDispatcher,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, hub: Hub, dispatcher: EventDispatcher, config: Config) -> Self {
        Self { store, hub, dispatcher, config: Arc::new(config) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
