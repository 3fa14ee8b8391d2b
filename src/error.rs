//! Error types for backend calls, validation and local I/O
//!
//! Errors are classified by recoverability:
//! - Retryable: network issues, timeouts, rate limits, 5xx responses
//! - NonRetryable: 4xx responses, undecodable payloads, local I/O
//! - RequiresUserAction: bad configuration, missing API key, invalid form input

use thiserror::Error;

use crate::validation::ValidationErrors;

/// Error types for the TCIS client
#[derive(Debug, Error)]
pub enum ApiError {
    // Retryable errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("API rate limit exceeded")]
    RateLimited,

    #[error("Server returned {status}: {body}")]
    Server { status: u16, body: String },

    // Non-retryable errors
    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(String),

    // Requires user action
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API key required for {0}")]
    MissingApiKey(&'static str),

    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
}

impl ApiError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout(_) | ApiError::RateLimited => true,
            ApiError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this error requires user action to resolve
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            ApiError::Config(_) | ApiError::MissingApiKey(_) | ApiError::Validation(_)
        ) || matches!(self, ApiError::Server { status: 401 | 403, .. })
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            ApiError::Network(_) => "Check that the TCIS backend is running and reachable.",
            ApiError::Timeout(_) => "The backend took too long to answer. Try again.",
            ApiError::RateLimited => "Wait a few minutes and try again.",
            ApiError::Server { status: 401 | 403, .. } => {
                "Check the apiKey in ~/.tcis/config.json or set TCIS_API_KEY."
            }
            ApiError::Server { status: 404, .. } => "The record was not found. Check the id.",
            ApiError::Server { status, .. } if *status >= 500 => {
                "The backend hit an internal error. Try again shortly."
            }
            ApiError::Server { .. } => "The backend rejected the request. Check the input.",
            ApiError::Decode(_) => "The backend answered with an unexpected payload.",
            ApiError::InvalidUrl(_) => "Check apiBaseUrl in ~/.tcis/config.json.",
            ApiError::Io(_) => "Check file permissions and disk space.",
            ApiError::Config(_) => "Fix ~/.tcis/config.json or remove it to use defaults.",
            ApiError::MissingApiKey(_) => "Set apiKey in ~/.tcis/config.json or TCIS_API_KEY.",
            ApiError::Validation(_) => "Correct the highlighted fields and submit again.",
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Io(err.to_string())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

/// Serializable error state for a single query
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Retryable,
    NonRetryable,
    RequiresUserAction,
}

impl From<&ApiError> for ErrorReport {
    fn from(err: &ApiError) -> Self {
        let error_type = if err.requires_user_action() {
            ErrorType::RequiresUserAction
        } else if err.is_retryable() {
            ErrorType::Retryable
        } else {
            ErrorType::NonRetryable
        };

        ErrorReport {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_retry_only_on_5xx() {
        let busy = ApiError::Server {
            status: 503,
            body: "busy".into(),
        };
        let bad = ApiError::Server {
            status: 422,
            body: "bad".into(),
        };
        assert!(busy.is_retryable());
        assert!(!bad.is_retryable());
    }

    #[test]
    fn test_unauthorized_requires_user_action() {
        let err = ApiError::Server {
            status: 401,
            body: String::new(),
        };
        let report = ErrorReport::from(&err);
        assert_eq!(report.error_type, ErrorType::RequiresUserAction);
        assert!(!report.can_retry);
        assert!(report.recovery_suggestion.contains("apiKey"));
    }

    #[test]
    fn test_network_error_report_is_retryable() {
        let report = ErrorReport::from(&ApiError::Network("refused".into()));
        assert_eq!(report.error_type, ErrorType::Retryable);
        assert!(report.can_retry);
        assert_eq!(report.message, "Network error: refused");
    }
}
