//! Single-flight token refresh.
//!
//! The coordinator owns the live [`Session`] and is the only place it is
//! written. Any number of callers may report a dead access token at once;
//! the first one starts a refresh on a spawned task and every other caller
//! awaits the same shared future, so the refresh endpoint is hit once and
//! all callers observe the same outcome.
//!
//! Each refresh is tagged with the session generation it started from.
//! Logout and login bump the generation, so a refresh that completes after
//! either of them is discarded instead of resurrecting the old session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::session::{Session, TokenGrant};
use super::store::TokenStore;
use crate::api::{AuthApi, AuthError};

type RefreshFuture = Shared<BoxFuture<'static, Result<Session, AuthError>>>;

struct InFlight {
    generation: u64,
    future: RefreshFuture,
}

struct SessionSlot {
    session: Session,
    generation: u64,
    in_flight: Option<InFlight>,
}

struct Inner {
    slot: Mutex<SessionSlot>,
    snapshots: watch::Sender<Session>,
    store: Arc<dyn TokenStore>,
    api: Arc<dyn AuthApi>,
    refresh_timeout: Duration,
}

/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        initial: Session,
        api: Arc<dyn AuthApi>,
        store: Arc<dyn TokenStore>,
        refresh_timeout: Duration,
    ) -> Self {
        let (snapshots, _) = watch::channel(initial.clone());
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(SessionSlot {
                    session: initial,
                    generation: 0,
                    in_flight: None,
                }),
                snapshots,
                store,
                api,
                refresh_timeout,
            }),
        }
    }

    /// Value copy of the latest published session.
    pub fn snapshot(&self) -> Session {
        self.inner.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.snapshots.subscribe()
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.lock().in_flight.is_some()
    }

    /// Get a session whose access token is newer than `current_access_token`.
    ///
    /// Joins an in-flight refresh if there is one. If the live token already
    /// differs from the caller's, someone else refreshed in the meantime and
    /// the live session is returned without touching the network. Otherwise
    /// a refresh is started. A failed refresh ends the session and resolves
    /// to [`AuthError::RefreshFailed`] for every waiter.
    pub async fn ensure_fresh_token(
        &self,
        current_access_token: Option<&str>,
    ) -> Result<Session, AuthError> {
        let pending = {
            let mut slot = self.inner.lock();

            let joined = slot
                .in_flight
                .as_ref()
                .map(|flight| (flight.generation, flight.future.clone()));

            if let Some((generation, future)) = joined {
                debug!(generation, "Joining in-flight token refresh");
                future
            } else {
                let live = match slot.session.access_token() {
                    Some(token) => token.to_string(),
                    None => return Err(AuthError::Unauthenticated),
                };

                if current_access_token != Some(live.as_str()) {
                    debug!("Access token already replaced, skipping refresh");
                    return Ok(slot.session.clone());
                }

                let refresh_token = match slot.session.refresh_token() {
                    Some(token) => token.to_string(),
                    None => {
                        warn!("No refresh token available, ending session");
                        self.inner.teardown(&mut slot);
                        return Err(AuthError::RefreshFailed(
                            "no refresh token available".to_string(),
                        ));
                    }
                };

                let generation = slot.generation;
                slot.session.begin_refresh();
                self.inner.publish(&slot.session);
                info!(generation, "Starting token refresh");

                let future = self.spawn_refresh(generation, refresh_token);
                slot.in_flight = Some(InFlight {
                    generation,
                    future: future.clone(),
                });
                future
            }
        };

        pending.await
    }

    fn spawn_refresh(&self, generation: u64, refresh_token: String) -> RefreshFuture {
        let task_inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let timeout = task_inner.refresh_timeout;
            let outcome = match tokio::time::timeout(timeout, task_inner.api.refresh(&refresh_token)).await {
                Ok(result) => result,
                Err(_) => Err(AuthError::RefreshFailed(format!(
                    "refresh timed out after {}s",
                    timeout.as_secs()
                ))),
            };
            task_inner.complete(generation, outcome)
        });

        let join_inner = Arc::clone(&self.inner);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => join_inner.complete(
                    generation,
                    Err(AuthError::RefreshFailed(format!("refresh task failed: {}", e))),
                ),
            }
        }
        .boxed()
        .shared()
    }

    /// Enter `Authenticating`, superseding any session or refresh in flight.
    /// Returns the generation the login must present to `install`.
    pub(crate) fn begin_login(&self) -> u64 {
        let mut slot = self.inner.lock();
        slot.generation += 1;
        slot.in_flight = None;
        slot.session = Session::authenticating();
        self.inner.store.clear();
        self.inner.publish(&slot.session);
        slot.generation
    }

    /// Install a freshly logged-in session, persisting it first.
    ///
    /// If a later login already completed, that session is returned instead.
    /// Fails with `Unauthenticated` only when the login was overtaken by a
    /// logout or by a login still in progress. A persistence failure is
    /// logged and does not undo the login.
    pub(crate) fn install(&self, generation: u64, session: Session) -> Result<Session, AuthError> {
        let mut slot = self.inner.lock();
        if slot.generation != generation {
            debug!(generation, live = slot.generation, "Discarding superseded login");
            return if slot.session.is_authenticated() {
                Ok(slot.session.clone())
            } else {
                Err(AuthError::Unauthenticated)
            };
        }
        if let Err(e) = self.inner.store.save(&session) {
            warn!(error = %e, "Failed to persist session");
        }
        slot.session = session;
        self.inner.publish(&slot.session);
        Ok(slot.session.clone())
    }

    /// Drop back to `Anonymous` after a failed login attempt.
    pub(crate) fn abandon_login(&self, generation: u64) {
        let mut slot = self.inner.lock();
        if slot.generation == generation {
            self.inner.teardown(&mut slot);
        }
    }

    /// Reset to `Anonymous` and clear the store. Any refresh in flight is
    /// orphaned. Returns the refresh token the session held, if any.
    pub(crate) fn teardown(&self) -> Option<String> {
        let mut slot = self.inner.lock();
        let refresh_token = slot.session.refresh_token().map(str::to_string);
        self.inner.teardown(&mut slot);
        refresh_token
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, session: &Session) {
        self.snapshots.send_replace(session.clone());
    }

    fn teardown(&self, slot: &mut SessionSlot) {
        slot.generation += 1;
        slot.in_flight = None;
        slot.session = Session::anonymous();
        self.store.clear();
        self.publish(&slot.session);
    }

    /// Apply a refresh outcome, unless the session moved on while it ran.
    fn complete(
        &self,
        generation: u64,
        outcome: Result<TokenGrant, AuthError>,
    ) -> Result<Session, AuthError> {
        let mut slot = self.lock();

        if slot.generation != generation {
            debug!(generation, live = slot.generation, "Discarding stale refresh result");
            return if slot.session.is_authenticated() {
                Ok(slot.session.clone())
            } else {
                Err(AuthError::Unauthenticated)
            };
        }

        slot.in_flight = None;
        match outcome {
            Ok(tokens) => {
                slot.session.apply_refresh(tokens);
                if let Err(e) = self.store.save(&slot.session) {
                    warn!(error = %e, "Failed to persist refreshed session");
                }
                self.publish(&slot.session);
                info!(expires_at = ?slot.session.expires_at(), "Access token refreshed");
                Ok(slot.session.clone())
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, ending session");
                self.teardown(&mut slot);
                Err(match e {
                    AuthError::RefreshFailed(reason) => AuthError::RefreshFailed(reason),
                    other => AuthError::RefreshFailed(other.to_string()),
                })
            }
        }
    }
}
