//! Application state shared across handlers

use std::sync::Arc;

use portico_auth::AuthService;
use portico_db::IdentityStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Identity store, for the internal API and readiness
    pub store: Arc<dyn IdentityStore>,
    /// Authentication service
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self {
            store: auth.store().clone(),
            auth,
        }
    }
}
