//! Core library for the backoffice client.
//!
//! Talks to the business-management REST API (users, roles, customers,
//! suppliers, products, purchase orders) and keeps the client-side
//! authentication session: bearer-token attachment, refresh-on-401 with a
//! single retry, and remember-me aware credential storage.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod navigation;

pub use api::{ApiClient, ApiError, RequestConfig};
pub use auth::{CredentialStore, CurrentTokens, Session, SessionData};
pub use config::Config;
pub use navigation::{LogNavigator, Navigator, LOGIN_PATH};
