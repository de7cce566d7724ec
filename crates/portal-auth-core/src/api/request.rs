//! Transport-neutral request and response values.
//!
//! The interceptor may send the same `ApiRequest` twice (once more after a
//! token refresh), so requests are plain data and the bearer token is
//! supplied separately at send time.

use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use super::AuthError;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: Vec<(String, String)>,
    body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, AuthError> {
        let value = serde_json::to_value(body)
            .map_err(|e| AuthError::InvalidResponse(format!("Failed to encode body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    status: StatusCode,
    body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AuthError> {
        serde_json::from_str(&self.body)
            .map_err(|e| AuthError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
    }

    /// Turn a non-2xx response into the matching error.
    pub fn error_for_status(self) -> Result<Self, AuthError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AuthError::from_status(self.status, &self.body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_request_builder() {
        let request = ApiRequest::post("/projects")
            .header("X-Trace", "abc")
            .json(&serde_json::json!({"name": "Survey"}))
            .expect("body should encode");

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.path(), "/projects");
        assert_eq!(request.headers(), &[("X-Trace".to_string(), "abc".to_string())]);
        assert_eq!(request.body(), Some(&serde_json::json!({"name": "Survey"})));
    }

    #[test]
    fn test_response_json_and_status() {
        #[derive(Deserialize)]
        struct Project {
            name: String,
        }

        let ok = ApiResponse::new(StatusCode::OK, r#"{"name": "Survey"}"#);
        let project: Project = ok.json().expect("json should parse");
        assert_eq!(project.name, "Survey");

        let denied = ApiResponse::new(StatusCode::FORBIDDEN, "nope");
        assert_eq!(
            denied.error_for_status(),
            Err(AuthError::Forbidden("nope".to_string()))
        );
    }
}
