//! HTTP client for the Quiz Master REST API.
//!
//! Every call goes through `ApiClient::execute`, which composes the request
//! interceptor, the network call and the response interceptor in that
//! order. Operations built on top only describe the request and decode the
//! result.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::interceptor::{OutboundRequest, RequestInterceptor, ResponseInterceptor};
use super::{ApiError, ApiResult};
use crate::auth::CredentialStore;
use crate::config::Config;
use crate::router::Navigator;

/// API client for the Quiz Master service.
/// Clone is cheap - reqwest::Client and the interceptors are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<CredentialStore>,
    request_stage: RequestInterceptor,
    response_stage: Arc<ResponseInterceptor>,
}

impl ApiClient {
    /// Create a client bound to a session store and a navigator.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        store: Arc<CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::from_transport)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_stage: RequestInterceptor::new(store.clone()),
            response_stage: Arc::new(ResponseInterceptor::new(store.clone(), navigator)),
            store,
        })
    }

    pub fn from_config(
        config: &Config,
        store: Arc<CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> ApiResult<Self> {
        Self::new(&config.api_base_url, config.request_timeout(), store, navigator)
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send one call through the interceptor pipeline.
    ///
    /// Returns the response only when its status is a success. A 401 has
    /// already torn the session down by the time `Err(Unauthorized)` comes
    /// back.
    pub async fn execute(&self, request: OutboundRequest) -> ApiResult<Response> {
        let request = self.request_stage.apply(request);

        let url = self.url(&request.path);
        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(request.headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        debug!(method = %request.method, url = %url, "Sending request");
        let sent = builder.send().await;

        let status = sent.as_ref().ok().map(Response::status);
        self.response_stage.inspect(status);

        let response = sent.map_err(|e| {
            warn!(method = %request.method, url = %url, error = %e, "Request failed");
            ApiError::from_transport(e)
        })?;
        Self::check_response(response).await
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status != StatusCode::UNAUTHORIZED {
            debug!(%status, "Request rejected by service");
        }
        Err(ApiError::from_status(status, &body))
    }

    /// Execute and decode a JSON body.
    pub async fn json<T: DeserializeOwned>(&self, request: OutboundRequest) -> ApiResult<T> {
        let path = request.path.clone();
        let response = self
            .execute(request.with_header(header::ACCEPT, header::HeaderValue::from_static("application/json")))
            .await?;

        let text = response.text().await.map_err(ApiError::from_transport)?;
        if text.trim().is_empty() {
            // Some endpoints answer with an empty body; decode it as null.
            return serde_json::from_value(Value::Null).map_err(|e| {
                ApiError::InvalidResponse(format!("Empty response from {}: {}", path, e))
            });
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", path, e)))
    }
}
