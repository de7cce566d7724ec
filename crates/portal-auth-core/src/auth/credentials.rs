use std::fmt;

use keyring::Entry;
use serde::Serialize;

use super::store::{StoreError, TokenStore};

/// Keychain service name for persisted sessions
const SERVICE_NAME: &str = "portal-auth";

/// Email/password pair submitted to the login endpoint.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

// Keep passwords out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Session record kept as a single secret in the OS keychain, one entry per
/// profile.
pub struct KeyringTokenStore {
    entry: Entry,
}

impl KeyringTokenStore {
    pub fn new(profile: &str) -> Result<Self, StoreError> {
        Ok(Self {
            entry: Entry::new(SERVICE_NAME, profile)?,
        })
    }
}

impl TokenStore for KeyringTokenStore {
    fn read(&self) -> Result<Option<String>, StoreError> {
        match self.entry.get_password() {
            Ok(contents) => Ok(Some(contents)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        self.entry.set_password(contents)?;
        Ok(())
    }

    fn remove(&self) -> Result<(), StoreError> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
