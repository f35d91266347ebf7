//! Authentication state: credential storage and the user session.
//!
//! This module provides:
//! - `StorageTier`: key-value persistence with memory, file and keyring backends
//! - `CredentialStore`: tokens and user record split across a durable and an
//!   ephemeral tier, selected by the remember-me flag
//! - `Session`: login, restore, logout and profile updates on top of `ApiClient`

pub mod credentials;
pub mod session;
pub mod storage;

pub use credentials::{CredentialStore, CurrentTokens};
pub use session::{Session, SessionData};
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, StorageError, StorageTier};
