use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::storage::{StorageResult, StorageTier};

pub const TOKEN_KEY: &str = "token";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "user";
pub const REMEMBER_ME_KEY: &str = "rememberMe";

const SESSION_KEYS: [&str; 4] = [TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY, REMEMBER_ME_KEY];

/// Tokens resolved by [`CredentialStore::current_tokens`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentTokens {
    pub token: Option<String>,
    pub refresh_token: Option<String>,
    pub remember_me: bool,
}

/// Session credentials split across a durable and an ephemeral tier.
///
/// `remember_me == true` selects the durable tier, `false` the ephemeral
/// one. The remember-me flag itself always lives in the durable tier.
#[derive(Clone)]
pub struct CredentialStore {
    durable: Arc<dyn StorageTier>,
    ephemeral: Arc<dyn StorageTier>,
}

impl CredentialStore {
    pub fn new(durable: Arc<dyn StorageTier>, ephemeral: Arc<dyn StorageTier>) -> Self {
        Self { durable, ephemeral }
    }

    fn tier(&self, remember_me: bool) -> &dyn StorageTier {
        if remember_me {
            self.durable.as_ref()
        } else {
            self.ephemeral.as_ref()
        }
    }

    fn tier_name(remember_me: bool) -> &'static str {
        if remember_me {
            "durable"
        } else {
            "ephemeral"
        }
    }

    /// Read faults are logged and reported as absent.
    fn read(&self, remember_me: bool, key: &str) -> Option<String> {
        match self.tier(remember_me).get_item(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, tier = Self::tier_name(remember_me), error = %e, "Failed to read credential");
                None
            }
        }
    }

    pub fn set_token(&self, token: &str, remember_me: bool) -> StorageResult<()> {
        self.tier(remember_me).set_item(TOKEN_KEY, token)
    }

    pub fn token(&self, remember_me: bool) -> Option<String> {
        self.read(remember_me, TOKEN_KEY)
    }

    pub fn set_refresh_token(&self, refresh_token: &str, remember_me: bool) -> StorageResult<()> {
        self.tier(remember_me).set_item(REFRESH_TOKEN_KEY, refresh_token)
    }

    pub fn refresh_token(&self, remember_me: bool) -> Option<String> {
        self.read(remember_me, REFRESH_TOKEN_KEY)
    }

    pub fn set_user<U: Serialize>(&self, user: &U, remember_me: bool) -> StorageResult<()> {
        let json = serde_json::to_string(user)?;
        self.tier(remember_me).set_item(USER_KEY, &json)
    }

    /// A stored user that fails to deserialize is treated as no user.
    pub fn user<U: DeserializeOwned>(&self, remember_me: bool) -> Option<U> {
        let raw = self.read(remember_me, USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(tier = Self::tier_name(remember_me), error = %e, "Ignoring malformed stored user");
                None
            }
        }
    }

    pub fn set_remember_me(&self, remember_me: bool) -> StorageResult<()> {
        let json = serde_json::to_string(&remember_me)?;
        self.durable.set_item(REMEMBER_ME_KEY, &json)
    }

    /// Defaults to false when unset or unreadable.
    pub fn remember_me(&self) -> bool {
        self.read(true, REMEMBER_ME_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or(false)
    }

    /// Resolve the active tokens, preferring the tier the remember-me flag
    /// selects and falling back to the other tier when it holds no access
    /// token. The flag can be stale relative to where tokens actually live.
    pub fn current_tokens(&self) -> CurrentTokens {
        let remember_me = self.remember_me();

        let mut token = self.token(remember_me);
        let mut refresh_token = self.refresh_token(remember_me);

        if token.is_none() {
            token = self.token(!remember_me);
            refresh_token = self.refresh_token(!remember_me);
            if token.is_some() {
                debug!(
                    preferred = Self::tier_name(remember_me),
                    "Tokens found in fallback tier"
                );
            }
        }

        CurrentTokens {
            token,
            refresh_token,
            remember_me,
        }
    }

    /// Remove every session key from both tiers.
    ///
    /// Every removal is attempted; the first failure is returned.
    pub fn clear_auth(&self) -> StorageResult<()> {
        let mut first_error = None;
        for tier in [self.durable.as_ref(), self.ephemeral.as_ref()] {
            for key in SESSION_KEYS {
                if let Err(e) = tier.remove_item(key) {
                    warn!(key, error = %e, "Failed to remove credential");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}
