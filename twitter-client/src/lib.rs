use async_trait::async_trait;
use tweetfeed_core::{Account, OwnedList, Page, Post, Result};

pub mod api;
pub mod auth;
pub mod metrics;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod rate_limiter;
pub mod retry;

pub use api::TwitterApiClient;
pub use auth::Credentials;
pub use metrics::{ApiMetrics, EndpointMetrics, MetricsCollector, RequestMetrics};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockCall, MockTwitterApi};
pub use rate_limiter::{
    estimate_total_duration, Endpoint, RateBudget, RateLimitConfig, RateLimitStatus, RateWindow,
};
pub use retry::{classify, retry_after_from_reset, FailureClass, DEFAULT_RATE_LIMIT_HOLD};

/// The platform calls the feed needs. Every method is one HTTP request and
/// costs one unit of its [`Endpoint`]'s budget; callers do the pacing.
#[async_trait]
pub trait TwitterApi: Send + Sync {
    /// One page of the accounts `account_id` follows.
    async fn get_followees(&self, account_id: &str, page_token: Option<&str>)
        -> Result<Page<Account>>;

    async fn get_list_members(&self, list_id: &str, page_token: Option<&str>)
        -> Result<Page<Account>>;

    async fn get_owned_lists(&self, owner_id: &str, page_token: Option<&str>)
        -> Result<Page<OwnedList>>;

    /// Resolves up to 100 handles. Unknown handles are left out of the result.
    async fn lookup_users(&self, handles: &[String]) -> Result<Vec<Account>>;

    /// Posts by `account_id` newer than `since`, at most `max_results`, in no
    /// particular order.
    async fn get_recent_posts(
        &self,
        account_id: &str,
        since: Option<&str>,
        max_results: u32,
    ) -> Result<Vec<Post>>;
}
