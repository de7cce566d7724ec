//! HTTP client for the portal API.
//!
//! `ApiClient` talks JSON over HTTPS to the portal backend. It implements
//! both [`AuthApi`] (login/refresh/logout) and [`Transport`] (everything
//! else), sharing one connection pool between them.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ApiRequest, ApiResponse, AuthApi, AuthError, Transport};
use crate::auth::{Credentials, Identity, LoginGrant, TokenGrant};
use crate::config::Config;

// ============================================================================
// Constants
// ============================================================================

const LOGIN_PATH: &str = "auth/login";
const REFRESH_PATH: &str = "auth/refresh-token";
const LOGOUT_PATH: &str = "auth/logout";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
    user: Identity,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
}

/// API client for the portal backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AuthError> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a request path against the base URL. Absolute URLs pass through.
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, AuthError> {
        let url = self.url(path);
        debug!(url = %url, "POST");
        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await?;
        Ok(response)
    }

    /// Read the error body of a failed response (best effort).
    fn refresh_rejected(status: StatusCode, body: &str) -> AuthError {
        AuthError::RefreshFailed(format!(
            "Status {}: {}",
            status,
            AuthError::truncate_body(body)
        ))
    }

    async fn error_body(response: reqwest::Response) -> (StatusCode, String) {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        (status, body)
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, AuthError> {
        let response = self.post_json(LOGIN_PATH, credentials).await?;

        if !response.status().is_success() {
            let (status, body) = Self::error_body(response).await;
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    AuthError::InvalidCredentials
                }
                _ => AuthError::from_status(status, &body),
            });
        }

        let login: LoginResponse = response.json().await?;
        Ok(LoginGrant {
            tokens: TokenGrant {
                access_token: login.access_token,
                refresh_token: login.refresh_token,
                expires_at: login.expires_at,
            },
            identity: login.user,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let response = self
            .post_json(REFRESH_PATH, &RefreshRequest { refresh_token })
            .await?;

        if !response.status().is_success() {
            let (status, body) = Self::error_body(response).await;
            warn!(status = %status, "Refresh endpoint rejected the refresh token");
            return Err(Self::refresh_rejected(status, &body));
        }

        let refreshed: RefreshResponse = response.json().await?;
        Ok(TokenGrant {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            expires_at: refreshed.expires_at,
        })
    }

    async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let response = self
            .post_json(LOGOUT_PATH, &RefreshRequest { refresh_token })
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let (status, body) = Self::error_body(response).await;
            Err(AuthError::from_status(status, &body))
        }
    }
}

#[async_trait]
impl Transport for ApiClient {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, AuthError> {
        let url = self.url(request.path());
        debug!(method = %request.method(), url = %url, authorized = bearer.is_some(), "Sending request");

        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .header(header::ACCEPT, "application/json");
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(ApiResponse::new(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, Duration::from_secs(5)).expect("client should build")
    }

    #[test]
    fn test_url_joining() {
        let api = client("https://portal.example.edu/api/");
        assert_eq!(api.url("/auth/login"), "https://portal.example.edu/api/auth/login");
        assert_eq!(api.url("projects"), "https://portal.example.edu/api/projects");
        assert_eq!(
            api.url("https://files.example.edu/x"),
            "https://files.example.edu/x"
        );
    }

    #[test]
    fn test_parse_login_response() {
        let json = r#"{
            "accessToken": "T1",
            "refreshToken": "R1",
            "expiresAt": "2030-01-01T00:00:00Z",
            "user": {"id": 12, "email": "a@u.edu", "fullName": "Ada", "role": "RESEARCHER", "department": "CS"}
        }"#;
        let parsed: LoginResponse = serde_json::from_str(json).expect("login response parses");
        assert_eq!(parsed.access_token, "T1");
        assert_eq!(parsed.refresh_token.as_deref(), Some("R1"));
        assert_eq!(parsed.user.id, "12");
        assert_eq!(parsed.user.role, "RESEARCHER");
        assert!(parsed.user.role_attributes.contains_key("department"));
    }

    #[test]
    fn test_parse_refresh_response_without_rotation() {
        let json = r#"{"accessToken": "T2", "expiresAt": "2030-01-01T01:00:00Z"}"#;
        let parsed: RefreshResponse = serde_json::from_str(json).expect("refresh response parses");
        assert_eq!(parsed.access_token, "T2");
        assert!(parsed.refresh_token.is_none());
    }

    #[test]
    fn test_refresh_rejection_carries_server_body() {
        let err = ApiClient::refresh_rejected(StatusCode::UNAUTHORIZED, "refresh token revoked");
        assert_eq!(
            err,
            AuthError::RefreshFailed("Status 401 Unauthorized: refresh token revoked".to_string())
        );
    }

    #[test]
    fn test_refresh_request_body() {
        let body = serde_json::to_value(RefreshRequest { refresh_token: "R1" })
            .expect("body serializes");
        assert_eq!(body, serde_json::json!({"refreshToken": "R1"}));
    }
}
