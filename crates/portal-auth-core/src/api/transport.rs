//! Seams between the session core and the network.

use async_trait::async_trait;

use super::{ApiRequest, ApiResponse, AuthError};
use crate::auth::{Credentials, LoginGrant, TokenGrant};

/// The three authentication endpoints.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /auth/login`
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, AuthError>;

    /// `POST /auth/refresh-token`
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;

    /// `POST /auth/logout`
    async fn logout(&self, refresh_token: &str) -> Result<(), AuthError>;
}

/// Sends an already-built request, attaching `bearer` when present.
///
/// Non-2xx statuses are returned as responses, not errors; only transport
/// failures are `Err`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, AuthError>;
}
