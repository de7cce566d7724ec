use reqwest::StatusCode;
use thiserror::Error;

/// Every failure the session core can surface.
///
/// `Clone` because a single refresh outcome is handed to every caller that
/// waited on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Network error: {0}")]
    NetworkError(String),

    /// A 401 from an endpoint, as mapped by `from_status`. Requests sent
    /// through the interceptor recover from it by refreshing instead.
    #[error("Access token expired")]
    TokenExpired,

    /// The session expired and could not be renewed. Terminal: the session
    /// has already been torn down when this is returned.
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Not authenticated - please log in again")]
    Unauthenticated,

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl AuthError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..end],
            body.len()
        )
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => AuthError::TokenExpired,
            403 => AuthError::Forbidden(truncated),
            500..=599 => AuthError::Server(truncated),
            _ => AuthError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// True for errors that mean the session is gone and the user has to
    /// log in again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AuthError::RefreshFailed(_) | AuthError::Unauthenticated
        )
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AuthError::InvalidResponse(e.to_string())
        } else {
            AuthError::NetworkError(e.to_string())
        }
    }
}
