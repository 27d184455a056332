//! Shared application state.
//!
//! Contains the state that is shared across all request handlers,
//! including configuration, storage, token issuance and mail delivery.

use std::sync::Arc;

use crate::auth::TokenAuthority;
use crate::config::ConfigV1;
use crate::mailer::Mailer;
use crate::store::Store;
use crate::utils::clock::Clock;
use crate::utils::deadline::Deadline;

/// Application state shared across all HTTP handlers.
///
/// This state is cloned for each request handler; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded at startup.
    pub config: Arc<ConfigV1>,
    /// The configured storage backend.
    pub store: Arc<dyn Store>,
    /// Issues and resolves bearer tokens against `store`.
    pub tokens: TokenAuthority<dyn Store>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(
        config: Arc<ConfigV1>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let tokens = TokenAuthority::new(store.clone(), clock);
        AppState {
            config,
            store,
            tokens,
            mailer,
        }
    }

    /// A fresh deadline for one storage call.
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.config.storage_timeout())
    }
}
