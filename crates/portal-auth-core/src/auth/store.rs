//! Durable mirror of the live session.
//!
//! A store only moves one opaque record around (`read`/`write`/`remove`); the
//! provided `load`/`save`/`clear` methods own the record format, so every
//! backend writes and clears all four keys as a single unit.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::session::{Identity, Session, TokenGrant};

/// Session file name in the profile cache directory
pub const SESSION_FILE: &str = "session.json";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode session record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

/// On-disk layout of a persisted session.
///
/// Every key is optional at the serde level so that a partial record can be
/// recognised and discarded instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub access_token: Option<String>,
    /// Outer `None`: key missing. `Some(None)`: key present, no refresh token.
    #[serde(default, deserialize_with = "present")]
    pub refresh_token: Option<Option<String>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: Option<Identity>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl PersistedSession {
    /// Record for a session holding tokens; `None` for one that does not.
    pub fn from_session(session: &Session) -> Option<Self> {
        let access_token = session.access_token()?;
        Some(Self {
            access_token: Some(access_token.to_string()),
            refresh_token: Some(session.refresh_token().map(str::to_string)),
            expires_at: session.expires_at(),
            user: session.identity().cloned(),
        })
    }

    /// Rebuild the session, or `None` if any of the four keys is missing.
    pub fn into_session(self) -> Option<Session> {
        match self {
            PersistedSession {
                access_token: Some(access_token),
                refresh_token: Some(refresh_token),
                expires_at: Some(expires_at),
                user: Some(user),
            } => Some(Session::authenticated(
                TokenGrant {
                    access_token,
                    refresh_token,
                    expires_at,
                },
                user,
            )),
            _ => None,
        }
    }
}

/// Key-value persistence for the current session's credentials.
pub trait TokenStore: Send + Sync {
    /// Raw record, or `None` if nothing is stored.
    fn read(&self) -> Result<Option<String>, StoreError>;

    /// Replace the stored record in one step.
    fn write(&self, contents: &str) -> Result<(), StoreError>;

    fn remove(&self) -> Result<(), StoreError>;

    /// Load the persisted session. Unreadable or partial records are treated
    /// as corrupt, and a record whose access token has already expired is
    /// stale. Either way it is discarded and cleared.
    fn load(&self) -> Option<Session> {
        let contents = match self.read() {
            Ok(Some(contents)) => contents,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session");
                return None;
            }
        };

        let session = serde_json::from_str::<PersistedSession>(&contents)
            .ok()
            .and_then(PersistedSession::into_session);

        match session {
            Some(session) if session.is_expired_at(Utc::now()) => {
                debug!(expires_at = ?session.expires_at(), "Discarding expired persisted session");
                self.clear();
                None
            }
            Some(session) => Some(session),
            None => {
                warn!("Discarding corrupt persisted session");
                self.clear();
                None
            }
        }
    }

    /// Persist the session. A session without tokens clears the store.
    fn save(&self, session: &Session) -> Result<(), StoreError> {
        match PersistedSession::from_session(session) {
            Some(record) => {
                let contents = serde_json::to_string_pretty(&record)?;
                self.write(&contents)
            }
            None => self.remove(),
        }
    }

    fn clear(&self) {
        if let Err(e) = self.remove() {
            warn!(error = %e, "Failed to clear persisted session");
        }
    }
}

/// JSON file in the profile cache directory.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            path: cache_dir.as_ref().join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn read(&self) -> Result<Option<String>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(&self.path)?))
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write-then-rename so a crash never leaves half a record behind
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = ?self.path, "Session persisted");
        Ok(())
    }

    fn remove(&self) -> Result<(), StoreError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Process-local store for embedding and tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    record: Mutex<Option<String>>,
    fail_writes: AtomicBool,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail, to exercise best-effort durability.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn is_empty(&self) -> bool {
        self.slot().is_none()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TokenStore for MemoryTokenStore {
    fn read(&self) -> Result<Option<String>, StoreError> {
        Ok(self.slot().clone())
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        *self.slot() = Some(contents.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<(), StoreError> {
        *self.slot() = None;
        Ok(())
    }
}
