//! Uniform reporting for the error enums in [`crate::error`].
//!
//! Whether a failure is worth retrying is decided by the client's failure
//! classification, not here; this module only names and describes errors.

use crate::error::*;
use std::fmt::Display;
use tracing::{debug, error, warn};

pub trait ErrorExt: Display {
    /// Stable machine-readable tag, e.g. `TWITTER_API`.
    fn error_code(&self) -> &'static str;

    /// One sentence for the terminal, without internal detail.
    fn user_friendly_message(&self) -> String;

    fn log_error(&self) -> &Self
    where
        Self: Sized,
    {
        error!(code = self.error_code(), "{}", self);
        self
    }

    fn log_warn(&self) -> &Self
    where
        Self: Sized,
    {
        warn!(code = self.error_code(), "{}", self);
        self
    }
}

impl ErrorExt for CoreError {
    fn error_code(&self) -> &'static str {
        match self {
            CoreError::TwitterApi(_) => "TWITTER_API",
            CoreError::Config(_) => "CONFIG",
            CoreError::Validation(_) => "VALIDATION",
            CoreError::Io(_) => "IO",
            CoreError::Serialization(_) => "SERIALIZATION",
            CoreError::Network(_) => "NETWORK",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::Resolution { .. } => "RESOLUTION",
            CoreError::Interrupted => "INTERRUPTED",
            CoreError::Internal { .. } => "INTERNAL",
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::TwitterApi(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Validation(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::NotFound { resource } => format!("Could not find: {}", resource),
            CoreError::Resolution { selector, reason } => {
                format!("Could not resolve accounts from {}: {}", selector, reason)
            }
            CoreError::Interrupted => "Stopped at user request.".to_string(),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }
}

impl ErrorExt for TwitterApiError {
    fn error_code(&self) -> &'static str {
        match self {
            TwitterApiError::AuthenticationFailed { .. } => "TWITTER_AUTH_FAILED",
            TwitterApiError::InvalidToken => "TWITTER_INVALID_TOKEN",
            TwitterApiError::RateLimitExceeded { .. } => "TWITTER_RATE_LIMIT",
            TwitterApiError::Forbidden { .. } => "TWITTER_FORBIDDEN",
            TwitterApiError::UserNotFound { .. } => "TWITTER_USER_NOT_FOUND",
            TwitterApiError::ListNotFound { .. } => "TWITTER_LIST_NOT_FOUND",
            TwitterApiError::RequestTimeout => "TWITTER_TIMEOUT",
            TwitterApiError::InvalidResponse { .. } => "TWITTER_INVALID_RESPONSE",
            TwitterApiError::InvalidRequest { .. } => "TWITTER_INVALID_REQUEST",
            TwitterApiError::ServerError { .. } => "TWITTER_SERVER_ERROR",
            TwitterApiError::EndpointUnavailable { .. } => "TWITTER_ENDPOINT_UNAVAILABLE",
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            TwitterApiError::AuthenticationFailed { .. } => {
                "Twitter authentication failed. Please check your credentials.".to_string()
            }
            TwitterApiError::InvalidToken => {
                "Twitter bearer token is invalid. Please re-authenticate.".to_string()
            }
            TwitterApiError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            TwitterApiError::Forbidden { resource } => format!(
                "Access denied to {}. The account may be protected or suspended.",
                resource
            ),
            TwitterApiError::UserNotFound { user_id } => {
                format!("User '{}' not found or has been deleted.", user_id)
            }
            TwitterApiError::ListNotFound { list_id } => {
                format!("List '{}' not found or is private.", list_id)
            }
            TwitterApiError::RequestTimeout => {
                "Request to Twitter timed out. Please try again.".to_string()
            }
            TwitterApiError::InvalidRequest { details } => {
                format!("Twitter rejected the request: {}", details)
            }
            _ => "Twitter API error occurred. Please try again later.".to_string(),
        }
    }
}

impl ErrorExt for ValidationError {
    fn error_code(&self) -> &'static str {
        match self {
            ValidationError::EmptySelector { .. } => "VALIDATION_EMPTY_SELECTOR",
            ValidationError::InvalidFileExtension { .. } => "VALIDATION_INVALID_FILE_EXTENSION",
            ValidationError::FileNotFound { .. } => "VALIDATION_FILE_NOT_FOUND",
            ValidationError::NegativeHeaderLine { .. } => "VALIDATION_NEGATIVE_HEADER_LINE",
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ValidationError::EmptySelector { kind } => {
                format!("The {} argument must not be empty.", kind)
            }
            ValidationError::InvalidFileExtension { path } => {
                format!("'{}' is not a csv file.", path)
            }
            ValidationError::FileNotFound { path } => format!("'{}' does not exist.", path),
            ValidationError::NegativeHeaderLine { value } => format!(
                "Header line number must be 0 (no header) or a line number, got {}.",
                value
            ),
        }
    }
}

impl ErrorExt for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND",
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD",
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE",
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR",
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR",
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => format!(
                "Environment variable '{}' is required but not set.",
                var_name
            ),
            ConfigError::Parse(_) => {
                "Configuration file format is invalid. Please check the settings.".to_string()
            }
        }
    }
}

/// Logs a run-ending error once, with its code and the nested error's detail.
pub fn report_error(error: &CoreError) {
    error.log_error();
    match error {
        CoreError::TwitterApi(e) => {
            debug!(code = e.error_code(), "Twitter API error details: {:?}", e)
        }
        CoreError::Config(e) => {
            debug!(code = e.error_code(), "Configuration error details: {:?}", e)
        }
        CoreError::Validation(e) => {
            debug!(code = e.error_code(), "Validation error details: {:?}", e)
        }
        _ => {}
    }
}
