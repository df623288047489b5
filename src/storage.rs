//! Persistent session storage using the OS credential store.
//!
//! On Windows this uses the Credential Manager (via the `keyring` crate), on
//! macOS Keychain, and on Linux the Secret Service API. Only the bearer token
//! and the role string are persisted; they live from login until logout.

use std::sync::Mutex;

use keyring::Entry;
use tracing::{info, warn};

use crate::error::{DeskError, Result};
use crate::session::Session;

const KEY_TOKEN: &str = "token";
const KEY_ROLE: &str = "role";

/// Where the signed-in session is kept between invocations.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Option<Session>;
    fn save(&self, session: &Session) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// OS keyring
// ---------------------------------------------------------------------------

pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Retrieve a single credential. Returns `None` when the entry does not
    /// exist (or the platform returns a "not found" error).
    fn get_credential(&self, key: &str) -> Option<String> {
        let entry = match Entry::new(&self.service, key) {
            Ok(e) => e,
            Err(e) => {
                warn!(key, error = %e, "keyring: failed to create entry");
                return None;
            }
        };
        match entry.get_password() {
            Ok(pw) => Some(pw),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(key, error = %e, "keyring: failed to read credential");
                None
            }
        }
    }

    fn set_credential(&self, key: &str, value: &str) -> Result<()> {
        let entry =
            Entry::new(&self.service, key).map_err(|e| DeskError::Storage(e.to_string()))?;
        entry
            .set_password(value)
            .map_err(|e| DeskError::Storage(e.to_string()))
    }

    /// Silently succeeds if the entry does not exist.
    fn delete_credential(&self, key: &str) -> Result<()> {
        let entry =
            Entry::new(&self.service, key).map_err(|e| DeskError::Storage(e.to_string()))?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(DeskError::Storage(e.to_string())),
        }
    }
}

impl SessionStore for KeyringStore {
    fn load(&self) -> Option<Session> {
        let token = self.get_credential(KEY_TOKEN)?;
        let role = self.get_credential(KEY_ROLE)?;
        match Session::from_parts(token, &role) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "stored session is unusable, ignoring it");
                None
            }
        }
    }

    fn save(&self, session: &Session) -> Result<()> {
        self.set_credential(KEY_TOKEN, session.token())?;
        self.set_credential(KEY_ROLE, session.role().as_str())?;
        info!(role = %session.role(), "session stored in credential store");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        for key in [KEY_TOKEN, KEY_ROLE] {
            self.delete_credential(key)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-process
// ---------------------------------------------------------------------------

/// Session store that lives only as long as the process.
#[derive(Default)]
pub struct MemoryStore {
    slot: Mutex<Option<(String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn load(&self) -> Option<Session> {
        let guard = self.slot.lock().ok()?;
        let (token, role) = guard.as_ref()?;
        Session::from_parts(token.clone(), role).ok()
    }

    fn save(&self, session: &Session) -> Result<()> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|e| DeskError::Storage(e.to_string()))?;
        *guard = Some((session.token().to_string(), session.role().as_str().to_string()));
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|e| DeskError::Storage(e.to_string()))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn memory_store_round_trip_and_clear() {
        let store = MemoryStore::new();
        assert!(store.load().is_none());

        let session = Session::new("tok-1", Role::Teacher);
        store.save(&session).expect("save");
        let loaded = store.load().expect("loaded");
        assert_eq!(loaded.token(), "tok-1");
        assert_eq!(loaded.role(), Role::Teacher);

        store.clear().expect("clear");
        assert!(store.load().is_none());
    }
}
