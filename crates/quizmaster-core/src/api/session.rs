//! Authentication calls. Login and register are the only paths that write
//! a session into the credential store.

use reqwest::Method;
use serde_json::Value;
use tracing::{info, warn};

use super::interceptor::OutboundRequest;
use super::{ApiClient, ApiError, ApiResult};
use crate::models::{AuthResponse, Identity, LoginRequest, ProfileResponse, RegisterRequest};

impl ApiClient {
    /// Authenticate and store the returned session.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<AuthResponse> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let request = OutboundRequest::new(Method::POST, "/auth/login").with_body(to_body(&body)?);
        let auth: AuthResponse = self.json(request).await?;
        self.store_session(&auth)?;
        info!(user = auth.user.display_name(), "Login successful");
        Ok(auth)
    }

    /// Create an account. The service signs the new user in directly.
    pub async fn register(&self, registration: &RegisterRequest) -> ApiResult<AuthResponse> {
        let request = OutboundRequest::new(Method::POST, "/auth/register").with_body(to_body(registration)?);
        let auth: AuthResponse = self.json(request).await?;
        self.store_session(&auth)?;
        info!(user = auth.user.display_name(), "Registration successful");
        Ok(auth)
    }

    /// End the session. The local session is always cleared, whether or not
    /// the service could be reached.
    pub async fn logout(&self) {
        let request = OutboundRequest::new(Method::POST, "/auth/logout");
        if let Err(e) = self.json::<Value>(request).await {
            warn!(error = %e, "Logout request failed; clearing local session anyway");
        }
        self.store().clear();
        info!("Logged out");
    }

    /// The user record as the service currently sees it.
    pub async fn profile(&self) -> ApiResult<Identity> {
        let profile: ProfileResponse =
            self.json(OutboundRequest::new(Method::GET, "/auth/profile")).await?;
        Ok(profile.user)
    }

    fn store_session(&self, auth: &AuthResponse) -> ApiResult<()> {
        self.store()
            .set(&auth.access_token, &auth.refresh_token, &auth.user)
            .map_err(|e| ApiError::Storage(format!("{:#}", e)))
    }
}

fn to_body<T: serde::Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request: {}", e)))
}
