//! Client-side session lifecycle for the research portal.
//!
//! Acquires, persists, proactively renews and reactively recovers the
//! session used to authorize every API call:
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use portal_auth_core::{ApiClient, ApiRequest, AuthSessionManager, Config, Credentials, RequestInterceptor};
//!
//! let config = Config::load()?;
//! let client = Arc::new(ApiClient::from_config(&config)?);
//! let manager = AuthSessionManager::new(client.clone(), config.token_store()?, config.session_settings());
//! manager.login(&Credentials::new("a@u.edu", "secret")).await?;
//!
//! let api = RequestInterceptor::new(manager, client);
//! let projects: serde_json::Value = api.execute_json(&ApiRequest::get("/projects")).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiClient, ApiRequest, ApiResponse, AuthApi, AuthError, RequestInterceptor, Transport};
pub use auth::{
    AuthSessionManager, Credentials, FileTokenStore, Identity, KeyringTokenStore, MemoryTokenStore,
    RefreshCoordinator, Session, SessionState, StoreError, TokenGrant, TokenStore,
};
pub use config::{Config, SessionSettings, StoreBackend};
