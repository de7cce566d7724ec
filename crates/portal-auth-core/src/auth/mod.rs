//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `Session`: the authenticated identity and its token material
//! - `TokenStore`: durable mirror of the session (file, keychain, memory)
//! - `RefreshCoordinator`: single-flight token refresh
//! - `AuthSessionManager`: login, logout and proactive renewal

pub mod coordinator;
pub mod credentials;
pub mod manager;
pub mod session;
pub mod store;

pub use coordinator::RefreshCoordinator;
pub use credentials::{Credentials, KeyringTokenStore};
pub use manager::AuthSessionManager;
pub use session::{Identity, LoginGrant, Session, SessionState, TokenGrant};
pub use store::{FileTokenStore, MemoryTokenStore, PersistedSession, StoreError, TokenStore};
