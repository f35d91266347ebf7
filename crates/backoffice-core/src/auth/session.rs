use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::api::{ApiClient, ApiError};
use crate::models::{ChangePasswordRequest, LoginRequest, ProfileUpdate, RegisterRequest, User};

use super::{CredentialStore, StorageError};

/// The authenticated state held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionData {
    pub token: String,
    pub refresh_token: Option<String>,
    pub user: User,
    pub remember_me: bool,
    /// Only known right after login; restored sessions do not carry it.
    pub token_expiration: Option<DateTime<Utc>>,
}

impl SessionData {
    pub fn is_expired(&self) -> bool {
        self.token_expiration
            .map(|expiry| Utc::now() > expiry)
            .unwrap_or(false)
    }

    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.token_expiration.map(|expiry| expiry - Utc::now())
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.time_until_expiry().map(|d| d.num_minutes().max(0))
    }
}

/// User session built on top of the API client and its credential store.
///
/// The store is the source of truth; `data` mirrors it for the current
/// process and is rebuilt by [`Session::restore`].
pub struct Session {
    api: ApiClient,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(api: ApiClient) -> Self {
        Self { api, data: None }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    fn store(&self) -> &Arc<CredentialStore> {
        self.api.store()
    }

    /// Rebuild the session from storage.
    ///
    /// Requires both an access token and a user record. The user is read
    /// from the tier the remember-me flag selects, then from the other tier.
    pub fn restore(&mut self) -> bool {
        let tokens = self.store().current_tokens();
        let user = self
            .store()
            .user::<User>(tokens.remember_me)
            .or_else(|| self.store().user::<User>(!tokens.remember_me));

        self.data = match (tokens.token, user) {
            (Some(token), Some(user)) => Some(SessionData {
                token,
                refresh_token: tokens.refresh_token,
                user,
                remember_me: tokens.remember_me,
                token_expiration: None,
            }),
            _ => None,
        };
        debug!(restored = self.data.is_some(), "Session restored from storage");
        self.data.is_some()
    }

    /// Authenticate and persist the new session in the tier selected by
    /// `request.remember_me`. Any previous session is cleared first.
    pub async fn login(&mut self, request: &LoginRequest) -> Result<&SessionData, ApiError> {
        let response = self.api.login(request).await?;

        if !response.is_authenticated {
            let message = response
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Login failed".to_string());
            return Err(ApiError::LoginRejected(message));
        }

        let expires_at = response.expires_at();
        let user = response
            .user
            .ok_or_else(|| ApiError::InvalidResponse("login response has no user".to_string()))?;

        let remember_me = request.remember_me;
        let store = self.store();
        store.clear_auth()?;
        store.set_token(&response.token, remember_me)?;
        store.set_refresh_token(&response.refresh_token, remember_me)?;
        store.set_user(&user, remember_me)?;
        store.set_remember_me(remember_me)?;

        info!(user_id = %user.id, remember_me, "Logged in");

        let refresh_token = Some(response.refresh_token).filter(|t| !t.is_empty());
        Ok(self.data.insert(SessionData {
            token: response.token,
            refresh_token,
            user,
            remember_me,
            token_expiration: expires_at,
        }))
    }

    pub async fn register(&self, registration: &RegisterRequest) -> Result<serde_json::Value, ApiError> {
        self.api.register(registration).await
    }

    pub async fn reset_password(&self, email: &str) -> Result<serde_json::Value, ApiError> {
        self.api.forgot_password(email).await
    }

    pub async fn change_password(
        &self,
        passwords: &ChangePasswordRequest,
    ) -> Result<serde_json::Value, ApiError> {
        self.api.change_password(passwords).await
    }

    /// Send a partial profile update and store the returned user in the
    /// session's tier.
    pub async fn update_profile(&mut self, update: &ProfileUpdate) -> Result<&User, ApiError> {
        let updated = self.api.update_profile(update).await?;
        let remember_me = self.remember_me();
        self.store().set_user(&updated, remember_me)?;

        self.replace_user(updated)
    }

    /// Fetch the current profile and store it in the session's tier.
    pub async fn refresh_profile(&mut self) -> Result<&User, ApiError> {
        let user = self.api.profile().await?;
        let remember_me = self.remember_me();
        self.store().set_user(&user, remember_me)?;
        self.replace_user(user)
    }

    fn replace_user(&mut self, user: User) -> Result<&User, ApiError> {
        match self.data.as_mut() {
            Some(data) => data.user = user,
            // Logged in by another process sharing the durable tier
            None => {
                self.restore();
            }
        }
        self.data
            .as_ref()
            .map(|d| &d.user)
            .ok_or(ApiError::AuthenticationFailed)
    }

    pub fn logout(&mut self) -> Result<(), StorageError> {
        self.data = None;
        self.store().clear_auth()?;
        info!("Logged out");
        Ok(())
    }

    /// Token and user present. The client may have ended the session since
    /// the last `restore`, so storage is consulted too.
    pub fn is_authenticated(&self) -> bool {
        self.data.is_some() && self.store().current_tokens().token.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.data.as_ref().map(|d| &d.user)
    }

    pub fn remember_me(&self) -> bool {
        self.data
            .as_ref()
            .map(|d| d.remember_me)
            .unwrap_or_else(|| self.store().remember_me())
    }

    pub fn token_expiration(&self) -> Option<DateTime<Utc>> {
        self.data.as_ref().and_then(|d| d.token_expiration)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.user().map(|u| u.has_role(role)).unwrap_or(false)
    }
}
