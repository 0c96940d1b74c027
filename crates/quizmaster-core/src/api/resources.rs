//! Uniform CRUD surface over the service's collections.
//!
//! Records are opaque JSON. Nothing is validated or cached client-side.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use reqwest::Method;
use serde_json::Value;
use thiserror::Error;

use super::interceptor::OutboundRequest;
use super::{ApiClient, ApiResult};

/// Filter parameters for list and search calls.
pub type Filters = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Subject,
    Chapter,
    Quiz,
    Question,
    Score,
    User,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        Self::Subject,
        Self::Chapter,
        Self::Quiz,
        Self::Question,
        Self::Score,
        Self::User,
    ];

    /// Collection path relative to the API base URL.
    pub const fn collection(&self) -> &'static str {
        match self {
            Self::Subject => "/subjects",
            Self::Chapter => "/chapters",
            Self::Quiz => "/quizzes",
            Self::Question => "/questions",
            Self::Score => "/scores",
            Self::User => "/users",
        }
    }

    pub fn item(&self, id: i64) -> String {
        format!("{}/{}", self.collection(), id)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Chapter => "chapter",
            Self::Quiz => "quiz",
            Self::Question => "question",
            Self::Score => "score",
            Self::User => "user",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown resource kind: {0} (expected one of subject, chapter, quiz, question, score, user)")]
pub struct ParseKindError(String);

impl FromStr for ResourceKind {
    type Err = ParseKindError;

    /// Accepts singular or plural names, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| lower == kind.name() || lower == kind.collection()[1..])
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

impl ApiClient {
    /// `GET /{collection}` with filter parameters.
    pub async fn list(&self, kind: ResourceKind, filters: &Filters) -> ApiResult<Value> {
        self.json(OutboundRequest::new(Method::GET, kind.collection()).with_query(filters.clone()))
            .await
    }

    /// `GET /{collection}/{id}`
    pub async fn get(&self, kind: ResourceKind, id: i64) -> ApiResult<Value> {
        self.json(OutboundRequest::new(Method::GET, kind.item(id))).await
    }

    /// `POST /{collection}`
    pub async fn create(&self, kind: ResourceKind, payload: Value) -> ApiResult<Value> {
        self.json(OutboundRequest::new(Method::POST, kind.collection()).with_body(payload))
            .await
    }

    /// `PUT /{collection}/{id}`
    pub async fn update(&self, kind: ResourceKind, id: i64, payload: Value) -> ApiResult<Value> {
        self.json(OutboundRequest::new(Method::PUT, kind.item(id)).with_body(payload))
            .await
    }

    /// `DELETE /{collection}/{id}`
    pub async fn delete(&self, kind: ResourceKind, id: i64) -> ApiResult<Value> {
        self.json(OutboundRequest::new(Method::DELETE, kind.item(id))).await
    }

    /// Role-specific dashboard summary.
    pub async fn dashboard(&self) -> ApiResult<Value> {
        self.json(OutboundRequest::new(Method::GET, "/dashboard")).await
    }

    /// Admin search. The service reads `q` and `type`.
    pub async fn search(&self, params: &Filters) -> ApiResult<Value> {
        self.json(OutboundRequest::new(Method::GET, "/search").with_query(params.clone()))
            .await
    }

    /// A quiz with its questions, without the answers.
    pub async fn quiz_for_attempt(&self, quiz_id: i64) -> ApiResult<Value> {
        self.json(OutboundRequest::new(Method::GET, format!("/quiz-attempt/{}", quiz_id)))
            .await
    }

    pub async fn submit_score(&self, payload: Value) -> ApiResult<Value> {
        self.create(ResourceKind::Score, payload).await
    }
}
