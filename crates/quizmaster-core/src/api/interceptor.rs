//! The two stages wrapped around every call.
//!
//! `RequestInterceptor` runs before transmission and attaches the bearer
//! credential. `ResponseInterceptor` runs before the caller sees the result
//! and terminates the session on a 401. Both are synchronous; the only
//! suspension point is the network call between them.

use std::sync::{Arc, Mutex, PoisonError};

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::CredentialStore;
use crate::router::{NavCommand, Navigator, RedirectTarget};

/// An outbound call before it is turned into an HTTP request.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    /// Path relative to the API base URL, starting with `/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub headers: HeaderMap,
}

impl OutboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_query<K, V>(mut self, query: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(query.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Attaches the current credential to outbound requests.
#[derive(Clone)]
pub struct RequestInterceptor {
    store: Arc<CredentialStore>,
}

impl RequestInterceptor {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    /// Add `Authorization: Bearer <credential>` when a session exists.
    /// Anonymous requests pass through untouched.
    pub fn apply(&self, mut request: OutboundRequest) -> OutboundRequest {
        let Some(token) = self.store.get() else {
            return request;
        };
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                request.headers.insert(header::AUTHORIZATION, value);
            }
            Err(_) => {
                warn!(path = %request.path, "Stored credential is not a valid header value; sending unauthenticated");
            }
        }
        request
    }
}

/// What the response stage decided about one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    PassThrough,
    /// Clear the session, then carry out `redirect` if present.
    Terminate { redirect: Option<NavCommand> },
}

/// Decides whether a response ends the session.
pub struct ResponseInterceptor {
    store: Arc<CredentialStore>,
    navigator: Arc<dyn Navigator>,
    // Serializes clear + redirect so concurrent 401s navigate once.
    termination: Mutex<()>,
}

impl ResponseInterceptor {
    pub fn new(store: Arc<CredentialStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            store,
            navigator,
            termination: Mutex::new(()),
        }
    }

    /// Pure decision. `status` is `None` when the request never produced a
    /// response (timeout, connection failure), which is never a trigger.
    pub fn decide(status: Option<StatusCode>, current_route: Option<&str>) -> Verdict {
        match status {
            Some(StatusCode::UNAUTHORIZED) => {
                let on_login = current_route == Some(RedirectTarget::Login.route_name());
                Verdict::Terminate {
                    redirect: (!on_login).then_some(NavCommand::Redirect(RedirectTarget::Login)),
                }
            }
            _ => Verdict::PassThrough,
        }
    }

    /// Run the response stage for one call and apply its verdict.
    pub fn inspect(&self, status: Option<StatusCode>) -> Verdict {
        if status != Some(StatusCode::UNAUTHORIZED) {
            return Verdict::PassThrough;
        }

        let _guard = self.termination.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.navigator.current_route();
        let verdict = Self::decide(status, current.as_deref());

        if let Verdict::Terminate { redirect } = verdict {
            if self.store.clear() {
                info!("Credential rejected by service; session terminated");
            } else {
                debug!("Credential rejected with no session stored");
            }
            if let Some(command) = redirect {
                self.navigator.execute(command);
            }
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStorage;
    use crate::models::Identity;
    use crate::router::{RouteTable, Router};

    fn signed_in() -> (Arc<CredentialStore>, Arc<Router>) {
        let store = Arc::new(CredentialStore::open(Box::new(MemoryStorage::new())));
        store.set("tok-1", "ref-1", &Identity::default()).unwrap();
        let router = Arc::new(Router::new(RouteTable::default(), store.clone()));
        (store, router)
    }

    #[test]
    fn test_request_interceptor_attaches_bearer() {
        let (store, _router) = signed_in();
        let request = RequestInterceptor::new(store).apply(OutboundRequest::new(Method::GET, "/subjects"));
        assert_eq!(
            request.headers.get(header::AUTHORIZATION).unwrap(),
            "Bearer tok-1"
        );
    }

    #[test]
    fn test_request_interceptor_passes_anonymous_through() {
        let store = Arc::new(CredentialStore::open(Box::new(MemoryStorage::new())));
        let original = OutboundRequest::new(Method::POST, "/auth/login")
            .with_header(header::ACCEPT, HeaderValue::from_static("application/json"));
        let request = RequestInterceptor::new(store).apply(original);
        assert!(request.headers.get(header::AUTHORIZATION).is_none());
        assert_eq!(request.headers.len(), 1);
    }

    #[test]
    fn test_request_interceptor_survives_unusable_credential() {
        let store = Arc::new(CredentialStore::open(Box::new(MemoryStorage::new())));
        store.set("bad\ntoken", "r", &Identity::default()).unwrap();
        let request = RequestInterceptor::new(store).apply(OutboundRequest::new(Method::GET, "/x"));
        assert!(request.headers.get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_decide_only_triggers_on_401() {
        for status in [StatusCode::OK, StatusCode::FORBIDDEN, StatusCode::NOT_FOUND, StatusCode::INTERNAL_SERVER_ERROR] {
            assert_eq!(ResponseInterceptor::decide(Some(status), Some("Dashboard")), Verdict::PassThrough);
        }
        assert_eq!(ResponseInterceptor::decide(None, Some("Dashboard")), Verdict::PassThrough);
        assert_eq!(
            ResponseInterceptor::decide(Some(StatusCode::UNAUTHORIZED), Some("Dashboard")),
            Verdict::Terminate {
                redirect: Some(NavCommand::Redirect(RedirectTarget::Login))
            }
        );
        assert_eq!(
            ResponseInterceptor::decide(Some(StatusCode::UNAUTHORIZED), Some("Login")),
            Verdict::Terminate { redirect: None }
        );
    }

    #[test]
    fn test_inspect_401_clears_store_and_redirects() {
        let (store, router) = signed_in();
        router.push("/dashboard").unwrap();
        let interceptor = ResponseInterceptor::new(store.clone(), router.clone());

        interceptor.inspect(Some(StatusCode::UNAUTHORIZED));

        assert_eq!(store.get(), None);
        assert_eq!(store.secondary(), None);
        assert_eq!(store.get_identity(), None);
        assert_eq!(router.current_route().as_deref(), Some("Login"));
    }

    #[test]
    fn test_inspect_repeated_401_on_login_does_not_navigate() {
        let (store, router) = signed_in();
        router.push("/profile").unwrap();
        let interceptor = ResponseInterceptor::new(store.clone(), router.clone());

        for _ in 0..3 {
            interceptor.inspect(Some(StatusCode::UNAUTHORIZED));
        }

        assert_eq!(router.history(), vec!["/profile".to_string(), "/login".to_string()]);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_inspect_other_errors_leave_session_alone() {
        let (store, router) = signed_in();
        router.push("/dashboard").unwrap();
        let interceptor = ResponseInterceptor::new(store.clone(), router.clone());

        assert_eq!(interceptor.inspect(Some(StatusCode::FORBIDDEN)), Verdict::PassThrough);
        assert_eq!(interceptor.inspect(None), Verdict::PassThrough);
        assert!(store.is_authenticated());
        assert_eq!(router.current_route().as_deref(), Some("Dashboard"));
    }
}
