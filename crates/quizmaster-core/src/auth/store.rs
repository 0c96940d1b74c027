use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::StorageBackend;
use crate::models::Identity;

/// Persisted key holding the bearer credential.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Persisted key holding the secondary credential. Stored, never sent.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
/// Persisted key holding the serialized identity record.
pub const IDENTITY_KEY: &str = "user";

/// Session state derived from the store in one consistent read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub authenticated: bool,
    pub is_admin: bool,
}

impl SessionSnapshot {
    pub const fn guest() -> Self {
        Self {
            authenticated: false,
            is_admin: false,
        }
    }

    pub const fn user() -> Self {
        Self {
            authenticated: true,
            is_admin: false,
        }
    }

    pub const fn admin() -> Self {
        Self {
            authenticated: true,
            is_admin: true,
        }
    }
}

#[derive(Debug, Default)]
struct Entries {
    access_token: Option<String>,
    refresh_token: Option<String>,
    identity: Option<String>,
}

impl Entries {
    fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.identity.is_none()
    }
}

/// Owner of the session credentials.
///
/// Entries are loaded from the backend once at `open` and mirrored in
/// memory. Every read and write takes the same lock, so a reader sees either
/// the full session or none of it.
pub struct CredentialStore {
    backend: Box<dyn StorageBackend>,
    entries: Mutex<Entries>,
}

impl CredentialStore {
    /// Open the store, picking up whatever an earlier run persisted.
    /// Unreadable entries are treated as absent.
    pub fn open(backend: Box<dyn StorageBackend>) -> Self {
        let read = |key: &str| match backend.read(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Failed to read persisted session entry");
                None
            }
        };
        let entries = Entries {
            access_token: read(ACCESS_TOKEN_KEY),
            refresh_token: read(REFRESH_TOKEN_KEY),
            identity: read(IDENTITY_KEY),
        };
        debug!(authenticated = entries.access_token.is_some(), "Credential store opened");

        Self {
            backend,
            entries: Mutex::new(entries),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist a new session, replacing any previous one.
    ///
    /// The access credential is written last so that a partial failure never
    /// leaves an authenticated-looking session behind.
    pub fn set(&self, credential: &str, secondary: &str, identity: &Identity) -> Result<()> {
        let serialized =
            serde_json::to_string(identity).context("Failed to serialize identity record")?;

        let mut entries = self.lock();
        let written = self
            .backend
            .write(IDENTITY_KEY, &serialized)
            .and_then(|()| self.backend.write(REFRESH_TOKEN_KEY, secondary))
            .and_then(|()| self.backend.write(ACCESS_TOKEN_KEY, credential));

        if let Err(e) = written {
            for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, IDENTITY_KEY] {
                if let Err(rollback) = self.backend.remove(key) {
                    warn!(key, error = %rollback, "Failed to roll back session entry");
                }
            }
            *entries = Entries::default();
            return Err(e.context("Failed to persist session"));
        }

        *entries = Entries {
            access_token: Some(credential.to_string()),
            refresh_token: Some(secondary.to_string()),
            identity: Some(serialized),
        };
        info!(user = identity.display_name(), is_admin = identity.is_admin, "Session stored");
        Ok(())
    }

    /// Erase the whole session. Safe to call any number of times.
    ///
    /// Returns `true` when there was something to erase. Backend failures are
    /// logged; the in-memory session is gone either way.
    pub fn clear(&self) -> bool {
        let mut entries = self.lock();
        if entries.is_empty() {
            return false;
        }
        *entries = Entries::default();

        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, IDENTITY_KEY] {
            if let Err(e) = self.backend.remove(key) {
                warn!(key, error = %e, "Failed to remove persisted session entry");
            }
        }
        info!("Session cleared");
        true
    }

    /// The bearer credential, if a session exists.
    pub fn get(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    /// The secondary credential. Nothing in this crate consumes it.
    pub fn secondary(&self) -> Option<String> {
        self.lock().refresh_token.clone()
    }

    /// The cached identity record. A corrupt record reads as absent.
    pub fn get_identity(&self) -> Option<Identity> {
        parse_identity(self.lock().identity.as_deref())
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().access_token.is_some()
    }

    /// Derived session state for the navigation guard.
    pub fn snapshot(&self) -> SessionSnapshot {
        let entries = self.lock();
        SessionSnapshot {
            authenticated: entries.access_token.is_some(),
            is_admin: parse_identity(entries.identity.as_deref())
                .map(|identity| identity.is_admin)
                .unwrap_or(false),
        }
    }
}

fn parse_identity(raw: Option<&str>) -> Option<Identity> {
    let raw = raw?;
    match serde_json::from_str(raw) {
        Ok(identity) => Some(identity),
        Err(e) => {
            warn!(error = %e, "Ignoring malformed identity record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStorage;

    fn admin() -> Identity {
        Identity {
            id: Some(1),
            name: Some("Admin".to_string()),
            is_admin: true,
            ..Default::default()
        }
    }

    /// Backend whose writes fail for one key.
    struct FailingWrites(&'static str, MemoryStorage);

    impl StorageBackend for FailingWrites {
        fn read(&self, key: &str) -> Result<Option<String>> {
            self.1.read(key)
        }

        fn write(&self, key: &str, value: &str) -> Result<()> {
            if key == self.0 {
                anyhow::bail!("disk full");
            }
            self.1.write(key, value)
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.1.remove(key)
        }
    }

    #[test]
    fn test_empty_store_is_guest() {
        let store = CredentialStore::open(Box::new(MemoryStorage::new()));
        assert_eq!(store.get(), None);
        assert_eq!(store.get_identity(), None);
        assert_eq!(store.snapshot(), SessionSnapshot::guest());
    }

    #[test]
    fn test_set_then_read_back() {
        let store = CredentialStore::open(Box::new(MemoryStorage::new()));
        store.set("tok", "ref", &admin()).unwrap();

        assert_eq!(store.get().as_deref(), Some("tok"));
        assert_eq!(store.secondary().as_deref(), Some("ref"));
        assert_eq!(store.get_identity(), Some(admin()));
        assert_eq!(store.snapshot(), SessionSnapshot::admin());
    }

    #[test]
    fn test_clear_removes_everything_and_is_idempotent() {
        let store = CredentialStore::open(Box::new(MemoryStorage::new()));
        store.set("tok", "ref", &admin()).unwrap();

        assert!(store.clear());
        assert!(!store.clear());
        assert_eq!(store.get(), None);
        assert_eq!(store.secondary(), None);
        assert_eq!(store.get_identity(), None);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_open_restores_persisted_session() {
        let storage = MemoryStorage::with_entries([
            (ACCESS_TOKEN_KEY, "persisted"),
            (IDENTITY_KEY, r#"{"is_admin": false, "name": "Lee"}"#),
        ]);
        let store = CredentialStore::open(Box::new(storage));
        assert_eq!(store.get().as_deref(), Some("persisted"));
        assert_eq!(store.snapshot(), SessionSnapshot::user());
    }

    #[test]
    fn test_corrupt_identity_degrades_to_no_identity() {
        let storage = MemoryStorage::with_entries([
            (ACCESS_TOKEN_KEY, "t"),
            (IDENTITY_KEY, "{{{not json"),
        ]);
        let store = CredentialStore::open(Box::new(storage));
        assert_eq!(store.get_identity(), None);
        assert_eq!(store.snapshot(), SessionSnapshot::user());
    }

    #[test]
    fn test_failed_set_leaves_no_session() {
        let backend = FailingWrites(ACCESS_TOKEN_KEY, MemoryStorage::new());
        let store = CredentialStore::open(Box::new(backend));

        assert!(store.set("tok", "ref", &admin()).is_err());
        assert_eq!(store.get(), None);
        assert_eq!(store.get_identity(), None);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_clear_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let open = || {
            CredentialStore::open(Box::new(crate::auth::FileStorage::new(dir.path().to_path_buf())))
        };

        let store = open();
        store.set("tok", "ref", &admin()).unwrap();
        assert!(open().is_authenticated());

        store.clear();
        let reopened = open();
        assert!(!reopened.is_authenticated());
        assert_eq!(reopened.secondary(), None);
    }
}
