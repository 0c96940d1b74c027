//! Session credential management.
//!
//! This module provides:
//! - `CredentialStore`: the single owner of the access credential, the
//!   secondary (refresh) credential and the cached identity record
//! - `StorageBackend`: durable key/value persistence behind the store, with
//!   file, OS keychain and in-memory implementations
//!
//! There is no client-side expiry. A session lasts until logout or until the
//! service rejects the credential.

pub mod credentials;
pub mod storage;
pub mod store;

pub use credentials::KeyringStorage;
pub use storage::{FileStorage, MemoryStorage, StorageBackend};
pub use store::{CredentialStore, SessionSnapshot, ACCESS_TOKEN_KEY, IDENTITY_KEY, REFRESH_TOKEN_KEY};
