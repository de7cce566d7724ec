//! Portal API access.
//!
//! This module provides the `ApiClient` for the portal's JSON endpoints, the
//! `AuthApi`/`Transport` seams the session core is written against, and the
//! `RequestInterceptor` that authorizes every outbound call.

pub mod client;
pub mod error;
pub mod interceptor;
pub mod request;
pub mod transport;

pub use client::ApiClient;
pub use error::AuthError;
pub use interceptor::RequestInterceptor;
pub use request::{ApiRequest, ApiResponse};
pub use transport::{AuthApi, Transport};
