use std::sync::{Arc, Mutex, MutexGuard};

use tocgen_core::config_file::WindowSettings;
use tocgen_core::{CompletionClient, GenerationSettings, SessionStore};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
///
/// The store lock is only taken for the synchronous halves of an action and
/// is never held across the completion request.
pub struct AppState {
    pub store: Mutex<SessionStore>,
    pub client: Arc<dyn CompletionClient>,
    pub settings: GenerationSettings,
    pub windowing: WindowSettings,
}

impl AppState {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        settings: GenerationSettings,
        windowing: WindowSettings,
    ) -> Self {
        Self {
            store: Mutex::new(SessionStore::new()),
            client,
            settings,
            windowing,
        }
    }

    pub fn store(&self) -> Result<MutexGuard<'_, SessionStore>, ApiError> {
        self.store
            .lock()
            .map_err(|_| ApiError::internal("session store lock poisoned"))
    }
}
