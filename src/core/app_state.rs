use std::sync::Arc;

use crate::browser::manager::SessionManager;
use crate::core::config::WardenConfig;
use crate::gate::LoginGate;
use crate::session::cookie_store::CookieStore;
use crate::session::resolver::LoginResolver;

/// Composition root: one shared instance of every stateful component,
/// constructed from the resolved config and handed to all callers. The gate
/// and session manager live here deliberately — nothing in this crate is a
/// module-level singleton.
#[derive(Clone)]
pub struct AppState {
    pub cookie_store: CookieStore,
    pub resolver: Arc<LoginResolver>,
    pub session: Arc<SessionManager>,
    pub gate: Arc<LoginGate>,
    pub login_url: String,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("cookie_file", &self.cookie_store.path())
            .field("threshold", &self.resolver.threshold())
            .field("browser_available", &self.session.browser_available())
            .finish()
    }
}

impl AppState {
    pub fn new(config: &WardenConfig) -> Self {
        let cookie_store = CookieStore::new(config.resolve_cookie_file());
        let resolver = Arc::new(LoginResolver::new(
            cookie_store.clone(),
            config.resolve_score_threshold(),
        ));
        let session = Arc::new(SessionManager::new(
            config.resolve_user_data_dir(),
            config.resolve_headless(),
        ));
        let gate = Arc::new(LoginGate::with_windows(
            config.resolve_gate_cooldown(),
            config.resolve_gate_stale(),
        ));
        Self {
            cookie_store,
            resolver,
            session,
            gate,
            login_url: config.resolve_login_url(),
        }
    }
}
