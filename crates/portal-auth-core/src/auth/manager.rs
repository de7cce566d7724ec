//! Login, logout and proactive renewal on top of the refresh coordinator.
//!
//! State machine:
//! `Anonymous -> Authenticating -> Authenticated <-> Refreshing`, and any
//! state drops to `Anonymous` on logout or when a refresh fails.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::coordinator::RefreshCoordinator;
use super::credentials::Credentials;
use super::session::{Session, SessionState};
use super::store::TokenStore;
use crate::api::{AuthApi, AuthError};
use crate::config::SessionSettings;

/// Owns the authenticated session for the whole process.
/// Clone is cheap and clones share state.
#[derive(Clone)]
pub struct AuthSessionManager {
    coordinator: RefreshCoordinator,
    api: Arc<dyn AuthApi>,
    settings: SessionSettings,
}

impl AuthSessionManager {
    /// Create the manager, rehydrating a persisted session if one is usable.
    ///
    /// `TokenStore::load` only yields unexpired, complete records; anything
    /// else has already been cleared and the manager starts `Anonymous`.
    pub fn new(
        api: Arc<dyn AuthApi>,
        store: Arc<dyn TokenStore>,
        settings: SessionSettings,
    ) -> Self {
        let initial = match store.load() {
            Some(session) => {
                debug!(expires_at = ?session.expires_at(), "Rehydrated persisted session");
                session
            }
            None => Session::anonymous(),
        };

        let coordinator =
            RefreshCoordinator::new(initial, api.clone(), store, settings.refresh_timeout);

        Self {
            coordinator,
            api,
            settings,
        }
    }

    /// Read-only snapshot of the live session.
    pub fn current_session(&self) -> Session {
        self.coordinator.snapshot()
    }

    /// Watch session changes, e.g. to redirect to login on forced logout.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.coordinator.subscribe()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Authenticate and install the resulting session.
    ///
    /// On failure the session is left `Anonymous` and the error is either
    /// `InvalidCredentials` or `NetworkError`.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let generation = self.coordinator.begin_login();
        info!(email = %credentials.email, "Logging in");

        match self.api.login(credentials).await {
            Ok(grant) => {
                let session = Session::authenticated(grant.tokens, grant.identity);
                let session = self.coordinator.install(generation, session)?;
                info!(
                    role = session.identity().map(|i| i.role.as_str()).unwrap_or_default(),
                    "Login successful"
                );
                Ok(session)
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                self.coordinator.abandon_login(generation);
                Err(match e {
                    AuthError::InvalidCredentials => AuthError::InvalidCredentials,
                    AuthError::NetworkError(reason) => AuthError::NetworkError(reason),
                    other => AuthError::NetworkError(other.to_string()),
                })
            }
        }
    }

    /// End the session. Local state is cleared first and unconditionally;
    /// the logout endpoint is then told on a best-effort basis.
    pub async fn logout(&self) {
        let refresh_token = self.coordinator.teardown();
        info!("Logged out");

        if let Some(token) = refresh_token {
            if let Err(e) = self.api.logout(&token).await {
                debug!(error = %e, "Logout endpoint call failed, ignoring");
            }
        }
    }

    /// Renew the access token early if it expires within the refresh skew.
    ///
    /// Only acts on an `Authenticated` session; a refresh already in flight
    /// is left alone. An error means the session was lost.
    pub async fn proactive_check(&self) -> Result<(), AuthError> {
        let session = self.current_session();
        if session.state() != SessionState::Authenticated {
            return Ok(());
        }
        if !session.needs_refresh(self.settings.skew(), Utc::now()) {
            return Ok(());
        }

        debug!(
            minutes_left = session.minutes_until_expiry(Utc::now()),
            "Access token near expiry, refreshing proactively"
        );
        self.coordinator
            .ensure_fresh_token(session.access_token())
            .await
            .map(|_| ())
    }

    /// Refresh on behalf of a caller holding `held_access_token`.
    pub async fn ensure_fresh_token(
        &self,
        held_access_token: Option<&str>,
    ) -> Result<Session, AuthError> {
        self.coordinator.ensure_fresh_token(held_access_token).await
    }
}
