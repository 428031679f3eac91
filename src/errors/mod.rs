//! Error handling module for the EcoNexus client core.
//!
//! Provides the crate error type and the mapping from remote error bodies
//! (PostgREST and GoTrue) into it.

use serde::{Deserialize, Serialize};

/// Error codes as constants to avoid stringly-typed errors.
pub mod codes {
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const BACKEND_ERROR: &str = "BACKEND_ERROR";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";
    pub const REALTIME_ERROR: &str = "REALTIME_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Message shown to the user whenever a call fails for connectivity reasons.
pub const NETWORK_FAILURE_MESSAGE: &str =
    "Network connection failed. Please check your internet connection and try again.";

/// PostgREST codes meaning the requested relation is not there.
const MISSING_RELATION_CODES: &[&str] = &["42P01", "PGRST205", "PGRST200"];

/// Application error type.
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Transport failure: unreachable host, dropped connection, timeout
    Network(String),
    /// Remote resource (table or row) does not exist
    NotFound(String),
    /// Auth rejected by the backend
    Unauthorized(String),
    /// Missing or malformed input, caught before any remote call
    Validation(String),
    /// Any other non-success response from the backend
    Backend { status: u16, message: String },
    /// Local key-value store failure
    Storage(String),
    /// Body could not be encoded or decoded
    Serialization(String),
    /// Realtime channel failure
    Realtime(String),
    /// Everything else
    Internal(String),
}

impl AppError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Network(_) => codes::NETWORK_ERROR,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Unauthorized(_) => codes::UNAUTHORIZED,
            AppError::Validation(_) => codes::VALIDATION_ERROR,
            AppError::Backend { .. } => codes::BACKEND_ERROR,
            AppError::Storage(_) => codes::STORAGE_ERROR,
            AppError::Serialization(_) => codes::SERIALIZATION_ERROR,
            AppError::Realtime(_) => codes::REALTIME_ERROR,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> String {
        match self {
            AppError::Network(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::Unauthorized(msg) => msg.clone(),
            AppError::Validation(msg) => msg.clone(),
            AppError::Backend { message, .. } => message.clone(),
            AppError::Storage(msg) => msg.clone(),
            AppError::Serialization(msg) => msg.clone(),
            AppError::Realtime(msg) => msg.clone(),
            AppError::Internal(msg) => msg.clone(),
        }
    }

    /// Whether this error looks like a connectivity failure.
    ///
    /// Besides the `Network` variant, any message mentioning "network" or
    /// "fetch" counts, since some transports only report failures as text.
    pub fn is_network_failure(&self) -> bool {
        if matches!(self, AppError::Network(_)) {
            return true;
        }
        let text = self.message().to_lowercase();
        text.contains("network") || text.contains("fetch")
    }

    /// Rewrite connectivity failures into the message shown to users.
    pub fn user_facing(self) -> AppError {
        if self.is_network_failure() {
            AppError::Network(NETWORK_FAILURE_MESSAGE.to_string())
        } else {
            self
        }
    }

    /// Build an error from a non-success HTTP status and its body text.
    pub fn from_response(status: u16, body: &str) -> AppError {
        let parsed: RemoteErrorBody = serde_json::from_str(body).unwrap_or_default();
        let message = parsed
            .best_message()
            .unwrap_or_else(|| format!("Request failed with status {}", status));

        let missing_relation = parsed
            .code
            .as_deref()
            .map(|c| MISSING_RELATION_CODES.contains(&c))
            .unwrap_or(false);

        if missing_relation || status == 404 {
            return AppError::NotFound(message);
        }

        match status {
            401 | 403 => AppError::Unauthorized(message),
            _ => AppError::Backend { status, message },
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        tracing::debug!("HTTP error: {:?}", err);
        if err.is_connect() || err.is_timeout() || err.is_request() {
            AppError::Network(format!("network request failed: {}", err))
        } else if err.is_decode() {
            AppError::Serialization(format!("Invalid response body: {}", err))
        } else if let Some(status) = err.status() {
            AppError::Backend {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            AppError::Internal(format!("HTTP error: {}", err))
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Storage error: {:?}", err);
        AppError::Storage(format!("Storage error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON error: {:?}", err);
        AppError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for AppError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Io(io) => AppError::Network(format!("network error on realtime socket: {}", io)),
            other => AppError::Realtime(format!("Realtime error: {}", other)),
        }
    }
}

/// Error body as returned by either the REST or the auth endpoints.
///
/// PostgREST sends `{code, message, details, hint}`; GoTrue sends some mix
/// of `{error, error_description, msg, message, code}`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RemoteErrorBody {
    #[serde(default, deserialize_with = "code_as_string")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl RemoteErrorBody {
    fn best_message(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
    }
}

// GoTrue reports `code` as a number (the HTTP status), PostgREST as a string.
fn code_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_table_maps_to_not_found() {
        let body = r#"{"code":"42P01","message":"relation \"public.energy_readings\" does not exist","details":null,"hint":null}"#;
        let err = AppError::from_response(400, body);
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(err.message().contains("energy_readings"));
    }

    #[test]
    fn test_gotrue_error_body() {
        let body = r#"{"code":400,"error_code":"invalid_credentials","msg":"Invalid login credentials"}"#;
        let err = AppError::from_response(400, body);
        assert_eq!(
            err,
            AppError::Backend {
                status: 400,
                message: "Invalid login credentials".to_string()
            }
        );
    }

    #[test]
    fn test_unauthorized_status() {
        let err = AppError::from_response(401, r#"{"message":"JWT expired"}"#);
        assert_eq!(err.error_code(), codes::UNAUTHORIZED);
    }

    #[test]
    fn test_unparseable_body_keeps_status() {
        let err = AppError::from_response(502, "<html>bad gateway</html>");
        assert_eq!(err.message(), "Request failed with status 502");
    }

    #[test]
    fn test_network_heuristic() {
        assert!(AppError::Internal("TypeError: network request failed".into()).is_network_failure());
        assert!(AppError::Internal("Failed to fetch".into()).is_network_failure());
        assert!(!AppError::Unauthorized("Invalid login credentials".into()).is_network_failure());
    }

    #[test]
    fn test_user_facing_rewrites_network_only() {
        let err = AppError::Internal("network request failed".into()).user_facing();
        assert_eq!(err, AppError::Network(NETWORK_FAILURE_MESSAGE.to_string()));

        let err = AppError::Validation("Email is required".into()).user_facing();
        assert_eq!(err.message(), "Email is required");
    }
}
