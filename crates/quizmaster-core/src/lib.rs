//! Quiz Master client core.
//!
//! This crate holds the client-side session and request gateway for the
//! Quiz Master service:
//!
//! - `auth`: the credential store and its storage backends
//! - `api`: the intercepted HTTP client, resource gateway and CSV export
//! - `router`: route table, navigation guard and the `Router` adapter
//! - `models`: wire types for authentication and identity
//! - `config`: client configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod router;

pub use api::{ApiClient, ApiError, ApiResult};
pub use auth::{CredentialStore, SessionSnapshot};
pub use config::Config;
pub use router::{GuardDecision, NavCommand, Navigator, RouteTable, Router};
