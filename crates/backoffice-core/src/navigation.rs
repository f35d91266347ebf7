//! Navigation requests raised by the API client.
//!
//! When a session cannot be renewed the client tears it down and asks the
//! host to send the user to the login entry point. The host decides what
//! "navigate" means: a browser redirect, a CLI prompt, a state change.

use tracing::warn;

/// Login entry point requested after an unrecoverable auth failure.
pub const LOGIN_PATH: &str = "/login";

pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Navigator that only records the request in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn navigate(&self, path: &str) {
        warn!(path, "Navigation requested");
    }
}
