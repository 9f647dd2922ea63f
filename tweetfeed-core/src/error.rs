use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Twitter API error: {0}")]
    TwitterApi(#[from] TwitterApiError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Could not resolve {selector}: {reason}")]
    Resolution { selector: String, reason: String },

    #[error("Interrupted by user")]
    Interrupted,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Error, Debug, Clone)]
pub enum TwitterApiError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Invalid bearer token")]
    InvalidToken,

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("User not found: {user_id}")]
    UserNotFound { user_id: String },

    #[error("List not found: {list_id}")]
    ListNotFound { list_id: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Request rejected by the API: {details}")]
    InvalidRequest { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("API endpoint unavailable: {endpoint}")]
    EndpointUnavailable { endpoint: String },
}

/// Problems with user-supplied input, detected before any API call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{kind} must be at least one character")]
    EmptySelector { kind: String },

    #[error("Following user file is not a csv file: {path}")]
    InvalidFileExtension { path: String },

    #[error("Following user file does not exist: {path}")]
    FileNotFound { path: String },

    #[error("Header line number must be 0 or greater, got {value}")]
    NegativeHeaderLine { value: i64 },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
