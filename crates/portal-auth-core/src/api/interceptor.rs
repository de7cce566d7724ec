//! Authorized request execution with one-shot recovery from 401s.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{ApiRequest, ApiResponse, AuthError, Transport};
use crate::auth::AuthSessionManager;

/// Wraps every outbound call: attaches the bearer token, and on a 401
/// refreshes the session and retries exactly once.
#[derive(Clone)]
pub struct RequestInterceptor {
    manager: AuthSessionManager,
    transport: Arc<dyn Transport>,
}

impl RequestInterceptor {
    pub fn new(manager: AuthSessionManager, transport: Arc<dyn Transport>) -> Self {
        Self { manager, transport }
    }

    pub fn manager(&self) -> &AuthSessionManager {
        &self.manager
    }

    /// Send `request` with the current access token.
    ///
    /// Any non-401 response is returned as is, as is any transport error.
    /// A 401 triggers one refresh and one retry; a second 401 is reported as
    /// `Forbidden` without refreshing again. If the session cannot be
    /// renewed the result is `Unauthenticated` and the session is gone.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, AuthError> {
        if let Err(e) = self.manager.proactive_check().await {
            warn!(error = %e, "Proactive refresh failed");
            return Err(AuthError::Unauthenticated);
        }

        let session = self.manager.current_session();
        let token = session.access_token();
        let response = self.transport.send(request, token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(path = request.path(), "Recovering from 401");
        let refreshed = match self.manager.ensure_fresh_token(token).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(error = %e, path = request.path(), "Session could not be renewed");
                return Err(AuthError::Unauthenticated);
            }
        };

        let retried = self
            .transport
            .send(request, refreshed.access_token())
            .await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(path = request.path(), "Request rejected again after refresh");
            return Err(AuthError::Forbidden(format!(
                "{} {} rejected after token refresh",
                request.method(),
                request.path()
            )));
        }
        Ok(retried)
    }

    /// `execute`, then fail on non-2xx and decode the JSON body.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, AuthError> {
        self.execute(request).await?.error_for_status()?.json()
    }
}
