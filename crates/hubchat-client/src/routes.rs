//! Screen routes and the session guard in front of them.

use std::sync::{Arc, Mutex};

use tracing::info;

use crate::lock;
use crate::session::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Root,
    Login,
    Register,
    Chat,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Root => "/",
            Self::Login => "/login",
            Self::Register => "/register",
            Self::Chat => "/chat",
        }
    }

    /// Unknown paths land on the root redirect.
    pub fn from_path(path: &str) -> Self {
        match path.trim_end_matches('/') {
            "/login" => Self::Login,
            "/register" => Self::Register,
            "/chat" => Self::Chat,
            _ => Self::Root,
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Apply the session guard: `/chat` needs a session, `/` redirects by
/// session presence.
pub fn resolve(route: Route, authenticated: bool) -> Route {
    match (route, authenticated) {
        (Route::Root, true) => Route::Chat,
        (Route::Root, false) => Route::Login,
        (Route::Chat, false) => Route::Login,
        (other, _) => other,
    }
}

/// Anything that can move the application to another screen.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator that applies the guard and remembers the current screen.
pub struct Router {
    session: Arc<SessionStore>,
    current: Mutex<Route>,
}

impl Router {
    pub fn new(session: Arc<SessionStore>) -> Self {
        let start = resolve(Route::Root, session.is_authenticated());
        Self {
            session,
            current: Mutex::new(start),
        }
    }

    pub fn current(&self) -> Route {
        *lock(&self.current)
    }
}

impl Navigator for Router {
    fn navigate(&self, route: Route) {
        let target = resolve(route, self.session.is_authenticated());
        if target != route {
            info!(requested = %route, redirect = %target, "Route guard redirect");
        } else {
            info!(route = %target, "Navigating");
        }
        *lock(&self.current) = target;
    }
}
