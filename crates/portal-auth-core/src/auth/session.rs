use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Lifecycle state of the authenticated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated,
    Refreshing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Anonymous => "anonymous",
            SessionState::Authenticating => "authenticating",
            SessionState::Authenticated => "authenticated",
            SessionState::Refreshing => "refreshing",
        };
        f.write_str(label)
    }
}

/// The user the portal issued tokens to.
///
/// Only `role` means anything to callers (for authorization display); any
/// extra attributes the server sends along with the user are kept verbatim
/// in `role_attributes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub email: String,
    #[serde(rename = "fullName")]
    pub display_name: String,
    pub role: String,
    #[serde(flatten)]
    pub role_attributes: BTreeMap<String, Value>,
}

impl Identity {
    /// Static role gate: true if this identity's role is in `allowed`.
    pub fn has_role(&self, allowed: &[&str]) -> bool {
        allowed.iter().any(|role| role.eq_ignore_ascii_case(&self.role))
    }
}

/// Server ids arrive as either JSON numbers or strings.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for id, got {}",
            other
        ))),
    }
}

/// Token material minted by the login or refresh endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// `None` when the server did not rotate the refresh token.
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful login: tokens plus the identity they belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginGrant {
    pub tokens: TokenGrant,
    pub identity: Identity,
}

/// In-memory representation of one authenticated identity.
///
/// Fields are private so the token/state invariant holds: an access token is
/// present exactly when the state is `Authenticated` or `Refreshing`. Values
/// handed out by the session manager are snapshots; mutating a clone has no
/// effect on the live session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    state: SessionState,
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    identity: Option<Identity>,
}

impl Default for Session {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            state: SessionState::Anonymous,
            access_token: None,
            refresh_token: None,
            expires_at: None,
            identity: None,
        }
    }

    pub(crate) fn authenticating() -> Self {
        Self {
            state: SessionState::Authenticating,
            ..Self::anonymous()
        }
    }

    pub fn authenticated(tokens: TokenGrant, identity: Identity) -> Self {
        Self {
            state: SessionState::Authenticated,
            access_token: Some(tokens.access_token),
            refresh_token: tokens.refresh_token,
            expires_at: Some(tokens.expires_at),
            identity: Some(identity),
        }
    }

    pub(crate) fn begin_refresh(&mut self) {
        if self.access_token.is_some() {
            self.state = SessionState::Refreshing;
        }
    }

    /// Swap in freshly minted tokens. The access token and its expiry always
    /// change together; the refresh token only if the server rotated it.
    pub(crate) fn apply_refresh(&mut self, tokens: TokenGrant) {
        self.access_token = Some(tokens.access_token);
        self.expires_at = Some(tokens.expires_at);
        if let Some(rotated) = tokens.refresh_token {
            self.refresh_token = Some(rotated);
        }
        self.state = SessionState::Authenticated;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// True while a bearer token is available to attach to requests.
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.state,
            SessionState::Authenticated | SessionState::Refreshing
        )
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(true)
    }

    /// Check if the access token expires within `skew` of `now`
    pub fn needs_refresh(&self, skew: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp - now < skew).unwrap_or(false)
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at
            .map(|exp| exp - now)
            .unwrap_or_else(Duration::zero)
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        self.time_until_expiry(now).num_minutes().max(0)
    }
}
