//! services/journal_api/src/web/state.rs
//!
//! Defines the application's shared state.

use mood_journal_core::{AuthSessionMonitor, Journal, JournalStore};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub journal: Arc<Journal>,
    pub session: Arc<AuthSessionMonitor>,
}

impl AppState {
    pub fn store(&self) -> &Arc<JournalStore> {
        self.journal.store()
    }
}
