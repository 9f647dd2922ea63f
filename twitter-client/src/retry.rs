use std::time::Duration;
use tweetfeed_core::{CoreError, TwitterApiError};

/// Default hold when a 429 arrives without a usable reset header.
pub const DEFAULT_RATE_LIMIT_HOLD: Duration = Duration::from_secs(15 * 60);

/// How the poller should treat a failed call for one account.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureClass {
    /// Try again on the next cycle with the same cursor.
    Transient,
    /// Try again on the next cycle, after the endpoint window reopens.
    RateLimited(Duration),
    /// The account cannot be polled any more; drop it from rotation.
    Permanent,
}

impl FailureClass {
    pub fn is_permanent(&self) -> bool {
        matches!(self, FailureClass::Permanent)
    }
}

/// Determine how a polling failure should be handled based on error type
pub fn classify(error: &CoreError) -> FailureClass {
    match error {
        CoreError::TwitterApi(twitter_error) => match twitter_error {
            // Rate limits wait for the platform's reset
            TwitterApiError::RateLimitExceeded { retry_after } => {
                FailureClass::RateLimited(Duration::from_secs(*retry_after))
            }
            // Server errors are usually transient
            TwitterApiError::ServerError { .. } => FailureClass::Transient,
            TwitterApiError::RequestTimeout => FailureClass::Transient,
            TwitterApiError::EndpointUnavailable { .. } => FailureClass::Transient,
            // A garbled body says nothing about the account itself
            TwitterApiError::InvalidResponse { .. } => FailureClass::Transient,
            // Deleted, suspended or protected accounts will not come back this run
            TwitterApiError::UserNotFound { .. } => FailureClass::Permanent,
            TwitterApiError::ListNotFound { .. } => FailureClass::Permanent,
            TwitterApiError::Forbidden { .. } => FailureClass::Permanent,
            // Sending the same rejected request again cannot succeed
            TwitterApiError::InvalidRequest { .. } => FailureClass::Permanent,
            TwitterApiError::AuthenticationFailed { .. } => FailureClass::Permanent,
            TwitterApiError::InvalidToken => FailureClass::Permanent,
        },
        // Network errors are transient
        CoreError::Network(_) => FailureClass::Transient,
        CoreError::Io(_) => FailureClass::Transient,
        CoreError::Serialization(_) => FailureClass::Transient,
        _ => FailureClass::Permanent,
    }
}

/// Seconds until the epoch-seconds `reset` value, falling back to
/// [`DEFAULT_RATE_LIMIT_HOLD`] when missing or already past.
pub fn retry_after_from_reset(reset: Option<i64>, now_epoch_secs: i64) -> u64 {
    match reset {
        Some(reset) if reset > now_epoch_secs => (reset - now_epoch_secs) as u64,
        _ => DEFAULT_RATE_LIMIT_HOLD.as_secs(),
    }
}
