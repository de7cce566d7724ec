#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portal_auth_core::auth::LoginGrant;
use portal_auth_core::{
    ApiRequest, ApiResponse, AuthApi, AuthError, AuthSessionManager, Credentials, Identity,
    MemoryTokenStore, RequestInterceptor, SessionSettings, TokenGrant, Transport,
};
use reqwest::StatusCode;
use tokio::sync::Notify;

pub fn identity() -> Identity {
    Identity {
        id: "17".to_string(),
        email: "a@u.edu".to_string(),
        display_name: "Ada Lovelace".to_string(),
        role: "researcher".to_string(),
        role_attributes: BTreeMap::new(),
    }
}

pub fn grant(access: &str, refresh: &str, expires_at: DateTime<Utc>) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        refresh_token: Some(refresh.to_string()),
        expires_at,
    }
}

/// Auth endpoints with scripted outcomes.
///
/// Refreshes default to minting `T{n+1}`/`R{n+1}` for the n-th call, valid
/// for an hour. With `hold_refreshes` set, every refresh parks until
/// `release_refreshes` is called.
pub struct ScriptedApi {
    login_result: Mutex<Result<LoginGrant, AuthError>>,
    refresh_results: Mutex<VecDeque<Result<TokenGrant, AuthError>>>,
    refresh_tokens_seen: Mutex<Vec<String>>,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    hold: Mutex<bool>,
    gate: Notify,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            login_result: Mutex::new(Ok(LoginGrant {
                tokens: grant("T1", "R1", Utc::now() + chrono::Duration::hours(1)),
                identity: identity(),
            })),
            refresh_results: Mutex::new(VecDeque::new()),
            refresh_tokens_seen: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            hold: Mutex::new(false),
            gate: Notify::new(),
        })
    }

    pub fn set_login(&self, result: Result<LoginGrant, AuthError>) {
        *self.login_result.lock().unwrap() = result;
    }

    pub fn login_expiring_at(&self, expires_at: DateTime<Utc>) {
        self.set_login(Ok(LoginGrant {
            tokens: grant("T1", "R1", expires_at),
            identity: identity(),
        }));
    }

    pub fn push_refresh(&self, result: Result<TokenGrant, AuthError>) {
        self.refresh_results.lock().unwrap().push_back(result);
    }

    pub fn hold_refreshes(&self) {
        *self.hold.lock().unwrap() = true;
    }

    pub fn release_refreshes(&self) {
        *self.hold.lock().unwrap() = false;
        self.gate.notify_waiters();
        self.gate.notify_one();
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_tokens_seen(&self) -> Vec<String> {
        self.refresh_tokens_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthApi for ScriptedApi {
    async fn login(&self, _credentials: &Credentials) -> Result<LoginGrant, AuthError> {
        self.login_result.lock().unwrap().clone()
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.refresh_tokens_seen
            .lock()
            .unwrap()
            .push(refresh_token.to_string());

        let held = *self.hold.lock().unwrap();
        if held {
            self.gate.notified().await;
        }

        let scripted = self.refresh_results.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(grant(
                &format!("T{}", n + 1),
                &format!("R{}", n + 1),
                Utc::now() + chrono::Duration::hours(1),
            ))
        })
    }

    async fn logout(&self, _refresh_token: &str) -> Result<(), AuthError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Err(AuthError::NetworkError("connection reset".to_string()))
    }
}

type Responder = dyn Fn(&ApiRequest, Option<&str>) -> Result<ApiResponse, AuthError> + Send + Sync;

/// Resource server answering from a closure; records the bearer of each call.
pub struct ScriptedTransport {
    responder: Box<Responder>,
    bearers: Mutex<Vec<Option<String>>>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest, Option<&str>) -> Result<ApiResponse, AuthError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            responder: Box::new(responder),
            bearers: Mutex::new(Vec::new()),
        })
    }

    /// 200 for `good_token`, 401 for anything else.
    pub fn accepting(good_token: &'static str) -> Arc<Self> {
        Self::new(move |_, bearer| {
            if bearer == Some(good_token) {
                Ok(ApiResponse::new(StatusCode::OK, r#"{"ok": true}"#))
            } else {
                Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, ""))
            }
        })
    }

    pub fn status(status: StatusCode) -> Arc<Self> {
        Self::new(move |_, _| Ok(ApiResponse::new(status, "")))
    }

    pub fn bearers(&self) -> Vec<Option<String>> {
        self.bearers.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.bearers.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, AuthError> {
        self.bearers
            .lock()
            .unwrap()
            .push(bearer.map(str::to_string));
        (self.responder)(request, bearer)
    }
}

pub fn settings() -> SessionSettings {
    SessionSettings {
        refresh_skew: Duration::from_secs(5 * 60),
        refresh_timeout: Duration::from_secs(30),
    }
}

pub struct Harness {
    pub api: Arc<ScriptedApi>,
    pub store: Arc<MemoryTokenStore>,
    pub manager: AuthSessionManager,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryTokenStore::new()))
    }

    pub fn with_store(store: Arc<MemoryTokenStore>) -> Self {
        let api = ScriptedApi::new();
        let manager = AuthSessionManager::new(api.clone(), store.clone(), settings());
        Self { api, store, manager }
    }

    pub async fn logged_in() -> Self {
        let harness = Self::new();
        harness.login().await;
        harness
    }

    pub async fn login(&self) {
        self.manager
            .login(&Credentials::new("a@u.edu", "x"))
            .await
            .expect("login should succeed");
    }

    pub fn interceptor(&self, transport: Arc<ScriptedTransport>) -> RequestInterceptor {
        RequestInterceptor::new(self.manager.clone(), transport)
    }
}

/// Let spawned tasks run up to their next suspension point.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
