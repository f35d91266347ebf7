use thiserror::Error;

use crate::auth::StorageError;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The session could not be renewed and has been torn down.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// Non-success response other than a recoverable 401.
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("{0}")]
    LoginRejected(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Failed to encode request body: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Maximum length for error response bodies in log output
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Build an error from a non-success response.
    ///
    /// The message is the body's `message` field, else its `title` field,
    /// else `HTTP {status}: {reason}`. Bodies that are empty or not JSON
    /// count as `{}`.
    pub fn from_response(status: reqwest::StatusCode, body: &str) -> Self {
        let parsed: serde_json::Value =
            serde_json::from_str(body).unwrap_or_else(|_| serde_json::json!({}));

        let field = |name: &str| {
            parsed
                .get(name)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let message = field("message").or_else(|| field("title")).unwrap_or_else(|| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
        });

        ApiError::Http {
            status: status.as_u16(),
            message,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::AuthenticationFailed => Some(401),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::AuthenticationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_message_field_wins() {
        let err = ApiError::from_response(
            StatusCode::BAD_REQUEST,
            r#"{"message": "Invalid data", "title": "Bad Request"}"#,
        );
        assert_eq!(err.to_string(), "Invalid data");
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_title_used_when_message_missing() {
        let err = ApiError::from_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"title": "One or more validation errors occurred.", "message": ""}"#,
        );
        assert_eq!(err.to_string(), "One or more validation errors occurred.");
    }

    #[test]
    fn test_synthesized_message_for_non_json_body() {
        let err = ApiError::from_response(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>");
        assert_eq!(err.to_string(), "HTTP 500: Internal Server Error");

        let err = ApiError::from_response(StatusCode::NOT_FOUND, "");
        assert_eq!(err.to_string(), "HTTP 404: Not Found");
    }

    #[test]
    fn test_truncate_body() {
        let short = "short body";
        assert_eq!(ApiError::truncate_body(short), short);

        let long = "é".repeat(400);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.contains("truncated, 800 total bytes"));
    }
}
