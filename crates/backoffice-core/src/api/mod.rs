//! REST API client module for the business-management backend.
//!
//! This module provides the `ApiClient` for calling the backend with
//! bearer-token authentication. Expired access tokens are renewed through
//! the refresh-token endpoint; a session that cannot be renewed is cleared.

pub mod client;
pub mod error;
pub mod transport;

pub use client::{ApiClient, RequestConfig, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::ApiError;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
