//! REST API client module for the Quiz Master service.
//!
//! This module provides the `ApiClient`, its interceptor pipeline and every
//! operation the front end calls:
//!
//! - `session`: login, register, logout, profile
//! - `resources`: list/get/create/update/delete per resource kind, plus
//!   dashboard, search and quiz attempts
//! - `export`: CSV downloads saved through a `FileSaver`
//!
//! The service authenticates with a JWT bearer token. A 401 from any call
//! terminates the local session.

pub mod client;
pub mod error;
pub mod export;
pub mod interceptor;
pub mod resources;
pub mod session;

pub use client::ApiClient;
pub use error::{ApiError, ApiResult};
pub use export::{DirectorySaver, ExportKind, FileSaver, ObjectId, SavedExport};
pub use interceptor::{OutboundRequest, RequestInterceptor, ResponseInterceptor, Verdict};
pub use resources::{Filters, ParseKindError, ResourceKind};


#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::future::join3;
    use httpmock::prelude::*;
    use serde_json::json;

    use super::test_support::client_for;
    use super::*;
    use crate::models::Identity;

    #[tokio::test]
    async fn test_concurrent_401s_clear_once_and_navigate_once() {
        let server = MockServer::start_async().await;
        let mut mocks = Vec::new();
        for path in ["/subjects", "/chapters", "/quizzes"] {
            mocks.push(
                server
                    .mock_async(|when, then| {
                        when.method(GET).path(path);
                        then.status(401).json_body(json!({"msg": "Token has expired"}));
                    })
                    .await,
            );
        }

        let (client, store, router) = client_for(&server, Duration::from_secs(5));
        store.set("tok", "ref", &Identity::default()).unwrap();
        router.push("/dashboard").unwrap();

        let filters = Filters::new();
        let (a, b, c) = join3(
            client.list(ResourceKind::Subject, &filters),
            client.list(ResourceKind::Chapter, &filters),
            client.list(ResourceKind::Quiz, &filters),
        )
        .await;

        assert!(a.unwrap_err().is_unauthorized());
        assert!(b.unwrap_err().is_unauthorized());
        assert!(c.unwrap_err().is_unauthorized());
        assert_eq!(store.get(), None);
        assert_eq!(store.secondary(), None);
        assert_eq!(store.get_identity(), None);
        assert_eq!(
            router.history(),
            vec!["/dashboard".to_string(), "/login".to_string()]
        );
        for mock in &mocks {
            mock.assert_async().await;
        }
    }
}
