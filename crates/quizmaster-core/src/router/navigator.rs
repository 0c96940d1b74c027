use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::guard::{self, GuardDecision};
use super::routes::{route_path, RedirectTarget, RouteError, RouteTable};
use crate::auth::CredentialStore;

/// Redirects a guarded transition may follow before giving up.
const MAX_REDIRECTS: usize = 4;

/// Navigation requested by the core and carried out by a `Navigator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavCommand {
    Redirect(RedirectTarget),
}

/// Adapter between core decisions and whatever displays views.
pub trait Navigator: Send + Sync {
    /// Name of the route currently displayed, if any.
    fn current_route(&self) -> Option<String>;

    fn execute(&self, command: NavCommand);
}

/// Result of a completed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    /// Path actually displayed.
    pub path: String,
    pub route: String,
    pub params: BTreeMap<String, String>,
    /// Originally requested path when the guard redirected.
    pub redirected_from: Option<String>,
}

#[derive(Debug, Default)]
struct RouterState {
    current: Option<Navigation>,
    history: Vec<String>,
}

/// Route table plus current location, with every transition guarded.
pub struct Router {
    routes: RouteTable,
    store: Arc<CredentialStore>,
    state: Mutex<RouterState>,
}

impl Router {
    pub fn new(routes: RouteTable, store: Arc<CredentialStore>) -> Self {
        Self {
            routes,
            store,
            state: Mutex::new(RouterState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn current(&self) -> Option<Navigation> {
        self.state().current.clone()
    }

    /// Every path displayed so far, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.state().history.clone()
    }

    /// Navigate to `target`, following guard redirects.
    ///
    /// Re-navigating to the displayed path is a no-op and is not recorded.
    pub fn push(&self, target: &str) -> Result<Navigation, RouteError> {
        let requested = route_path(target).to_string();
        let mut path = requested.clone();

        for _ in 0..MAX_REDIRECTS {
            let (route, params) = self
                .routes
                .resolve(&path)
                .ok_or_else(|| RouteError::NotFound(path.clone()))?;

            let session = self.store.snapshot();
            match guard::evaluate(route, &session) {
                GuardDecision::Allowed => {
                    let navigation = Navigation {
                        path: path.clone(),
                        route: route.name().to_string(),
                        params,
                        redirected_from: (path != requested).then(|| requested.clone()),
                    };
                    self.commit(&navigation);
                    return Ok(navigation);
                }
                GuardDecision::Redirect(redirect) => {
                    let next = self
                        .routes
                        .by_name(redirect.route_name())
                        .ok_or(RouteError::MissingRedirectTarget(redirect.route_name()))?;
                    debug!(from = %path, to = next.path(), ?session, "Navigation redirected");
                    path = next.path().to_string();
                }
            }
        }

        warn!(target = %requested, "Redirect limit reached");
        Err(RouteError::RedirectLoop(requested))
    }

    fn commit(&self, navigation: &Navigation) {
        let mut state = self.state();
        let unchanged = state
            .current
            .as_ref()
            .is_some_and(|current| current.path == navigation.path);
        if !unchanged {
            state.history.push(navigation.path.clone());
            info!(path = %navigation.path, route = %navigation.route, "Navigated");
        }
        state.current = Some(navigation.clone());
    }
}

impl Navigator for Router {
    fn current_route(&self) -> Option<String> {
        self.state().current.as_ref().map(|nav| nav.route.clone())
    }

    fn execute(&self, command: NavCommand) {
        let NavCommand::Redirect(target) = command;
        let Some(route) = self.routes.by_name(target.route_name()) else {
            warn!(route = target.route_name(), "Redirect target missing from route table");
            return;
        };
        let path = route.path().to_string();
        if let Err(e) = self.push(&path) {
            warn!(error = %e, "Redirect failed");
        }
    }
}
