//! Wire models for the Quiz Master service.
//!
//! Only the authentication surface is typed here. Domain resources
//! (subjects, chapters, quizzes, questions, scores, users) are passed
//! through as opaque JSON.

pub mod auth;

pub use auth::{AuthResponse, Identity, LoginRequest, ProfileResponse, RegisterRequest};
