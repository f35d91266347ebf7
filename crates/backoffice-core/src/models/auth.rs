use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::User;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub remember_me: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginResponse {
    pub is_authenticated: bool,
    pub token: String,
    pub refresh_token: String,
    pub token_expiration: Option<String>,
    pub message: Option<String>,
    pub user: Option<User>,
    pub errors: Vec<String>,
}

impl LoginResponse {
    /// Parse `tokenExpiration`. The backend sends RFC 3339, sometimes
    /// without an offset; offset-less timestamps are taken as UTC.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.token_expiration.as_deref()?)
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub tipo_identificacion: String,
    pub numero_identificacion: String,
    pub names: String,
    pub surnames: String,
    pub fecha_nacimiento: String,
    pub sexo: String,
    pub ciudad: String,
    pub pais: String,
    pub direccion: String,
    pub phone_number: String,
    pub department: String,
    pub employee_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub token: String,
    pub refresh_token: String,
}
