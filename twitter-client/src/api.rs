use crate::metrics::{ApiMetrics, MetricsCollector, RequestMetrics};
use crate::rate_limiter::Endpoint;
use crate::retry::retry_after_from_reset;
use crate::TwitterApi;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tweetfeed_core::{
    Account, ApiConfig, ConfigError, CoreError, OwnedList, Page, Post, Result, TwitterApiError,
};
use url::Url;

const USER_FIELDS: &str = "id,name,username";
const TWEET_FIELDS: &str = "created_at,author_id";
/// `/2/users/:id/following` pages hold up to 1000 accounts.
const FOLLOWING_PAGE_RESULTS: &str = "1000";
/// List members and owned lists pages hold up to 100 entries.
const LIST_PAGE_RESULTS: &str = "100";
/// The users-by-username endpoint takes at most this many handles per call.
pub const LOOKUP_BATCH_SIZE: usize = 100;

/// Envelope shared by every v2 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub meta: Option<ResponseMeta>,
    #[serde(default)]
    pub errors: Vec<ApiProblem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub result_count: Option<u32>,
    pub next_token: Option<String>,
    pub newest_id: Option<String>,
    pub oldest_id: Option<String>,
}

/// Partial errors reported next to (or instead of) `data`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiProblem {
    pub title: Option<String>,
    pub detail: Option<String>,
    pub message: Option<String>,
    #[serde(rename = "type")]
    pub problem_type: Option<String>,
    pub resource_type: Option<String>,
    pub value: Option<String>,
}

impl ApiProblem {
    fn is_not_found(&self) -> bool {
        self.problem_type
            .as_deref()
            .is_some_and(|t| t.ends_with("resource-not-found"))
    }

    fn is_not_authorized(&self) -> bool {
        self.problem_type
            .as_deref()
            .is_some_and(|t| t.ends_with("not-authorized-for-resource"))
    }

    fn describe(&self) -> String {
        self.detail
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.title.clone())
            .unwrap_or_else(|| "unknown problem".to_string())
    }
}

/// Body of a non-2xx response: one top-level problem, optionally with
/// per-parameter details.
#[derive(Debug, Clone, Default, Deserialize)]
struct ErrorBody {
    #[serde(flatten)]
    problem: ApiProblem,
    #[serde(default)]
    errors: Vec<ApiProblem>,
}

impl ErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn is_not_found(&self) -> bool {
        self.problem.is_not_found() || self.errors.iter().any(ApiProblem::is_not_found)
    }

    fn describe(&self) -> String {
        let mut details = vec![self.problem.describe()];
        details.extend(self.errors.iter().map(ApiProblem::describe));
        details.join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub id: String,
    pub name: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TweetData {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListData {
    pub id: String,
    pub name: String,
}

impl From<UserData> for Account {
    fn from(user: UserData) -> Self {
        Account::new(user.id, user.name).with_username(user.username)
    }
}

impl From<ListData> for OwnedList {
    fn from(list: ListData) -> Self {
        OwnedList {
            id: list.id,
            name: list.name,
        }
    }
}

impl TweetData {
    fn into_post(self, account_id: &str) -> Result<Post> {
        let created_at = self.created_at.ok_or_else(|| {
            CoreError::TwitterApi(TwitterApiError::InvalidResponse {
                details: format!("Post {} has no created_at", self.id),
            })
        })?;

        Ok(Post {
            author_id: self.author_id.unwrap_or_else(|| account_id.to_string()),
            id: self.id,
            text: self.text,
            created_at,
        })
    }
}

/// What a 404 or a "resource-not-found" problem refers to.
#[derive(Debug, Clone, Copy)]
enum Subject<'a> {
    User(&'a str),
    List(&'a str),
    None,
}

impl Subject<'_> {
    fn not_found(self, path: &str) -> TwitterApiError {
        match self {
            Subject::User(id) => TwitterApiError::UserNotFound {
                user_id: id.to_string(),
            },
            Subject::List(id) => TwitterApiError::ListNotFound {
                list_id: id.to_string(),
            },
            Subject::None => TwitterApiError::EndpointUnavailable {
                endpoint: path.to_string(),
            },
        }
    }
}

#[derive(Debug)]
pub struct TwitterApiClient {
    http_client: Client,
    base_url: Url,
    bearer_token: String,
    metrics: Arc<MetricsCollector>,
}

impl TwitterApiClient {
    pub fn new(config: &ApiConfig, bearer_token: String) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|_| ConfigError::InvalidValue {
            field: "api.base_url".to_string(),
            value: config.base_url.clone(),
        })?;

        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            bearer_token,
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        path: &str,
        subject: Subject<'_>,
        query: &[(&str, &str)],
    ) -> Result<ApiResponse<T>> {
        let url = self.base_url.join(path).map_err(|e| CoreError::Internal {
            message: format!("Invalid request path {}: {}", path, e),
        })?;
        let start_time = Instant::now();

        debug!("Making Twitter API request: GET {}", path);
        let outcome = self
            .http_client
            .get(url)
            .bearer_auth(&self.bearer_token)
            .query(query)
            .send()
            .await;

        let result = match outcome {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    response.json::<ApiResponse<T>>().await.map_err(|e| {
                        error!("Failed to parse response for {}: {}", path, e);
                        CoreError::TwitterApi(TwitterApiError::InvalidResponse {
                            details: format!("Failed to parse response for {}", path),
                        })
                    })
                } else {
                    let reset = response
                        .headers()
                        .get("x-rate-limit-reset")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<i64>().ok());
                    let body = response.text().await.unwrap_or_default();
                    Err(error_for_status(status, reset, &body, path, subject))
                }
            }
            Err(e) => {
                error!("Network error for GET {}: {}", path, e);
                if e.is_timeout() {
                    Err(CoreError::TwitterApi(TwitterApiError::RequestTimeout))
                } else {
                    Err(CoreError::Network(e))
                }
            }
        };

        let (status_code, rate_limited) = match &result {
            Ok(_) => (Some(200), false),
            Err(CoreError::TwitterApi(TwitterApiError::RateLimitExceeded { .. })) => {
                (Some(429), true)
            }
            Err(CoreError::TwitterApi(TwitterApiError::ServerError { status_code })) => {
                (Some(*status_code), false)
            }
            Err(_) => (None, false),
        };
        self.metrics
            .record_request(RequestMetrics {
                endpoint,
                status_code,
                response_time: start_time.elapsed(),
                success: result.is_ok(),
                rate_limited,
            })
            .await;

        result
    }

    async fn get_accounts_page(
        &self,
        endpoint: Endpoint,
        path: &str,
        subject: Subject<'_>,
        max_results: &str,
        page_token: Option<&str>,
    ) -> Result<Page<Account>> {
        let mut query = vec![("max_results", max_results), ("user.fields", USER_FIELDS)];
        if let Some(token) = page_token {
            query.push(("pagination_token", token));
        }

        let response: ApiResponse<Vec<UserData>> =
            self.get(endpoint, path, subject, &query).await?;
        let (items, next_token) = into_page(response, path, subject)?;
        debug!("Retrieved {} accounts from {}", items.len(), path);

        Ok(Page {
            items: items.into_iter().map(Account::from).collect(),
            next_token,
        })
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.get_metrics().await
    }

    /// Logs request counts per endpoint for the run so far.
    pub async fn log_metrics_summary(&self) {
        self.metrics.log_summary().await;
    }
}

#[async_trait]
impl TwitterApi for TwitterApiClient {
    async fn get_followees(
        &self,
        account_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<Account>> {
        let path = format!("/2/users/{}/following", account_id);
        self.get_accounts_page(
            Endpoint::Followees,
            &path,
            Subject::User(account_id),
            FOLLOWING_PAGE_RESULTS,
            page_token,
        )
        .await
    }

    async fn get_list_members(
        &self,
        list_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<Account>> {
        let path = format!("/2/lists/{}/members", list_id);
        self.get_accounts_page(
            Endpoint::ListMembers,
            &path,
            Subject::List(list_id),
            LIST_PAGE_RESULTS,
            page_token,
        )
        .await
    }

    async fn get_owned_lists(
        &self,
        owner_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<OwnedList>> {
        let path = format!("/2/users/{}/owned_lists", owner_id);
        let mut query = vec![("max_results", LIST_PAGE_RESULTS)];
        if let Some(token) = page_token {
            query.push(("pagination_token", token));
        }

        let subject = Subject::User(owner_id);
        let response: ApiResponse<Vec<ListData>> = self
            .get(Endpoint::OwnedLists, &path, subject, &query)
            .await?;
        let (items, next_token) = into_page(response, &path, subject)?;

        Ok(Page {
            items: items.into_iter().map(OwnedList::from).collect(),
            next_token,
        })
    }

    async fn lookup_users(&self, handles: &[String]) -> Result<Vec<Account>> {
        if handles.is_empty() {
            return Ok(Vec::new());
        }
        if handles.len() > LOOKUP_BATCH_SIZE {
            return Err(CoreError::Internal {
                message: format!(
                    "Users lookup takes at most {} handles, got {}",
                    LOOKUP_BATCH_SIZE,
                    handles.len()
                ),
            });
        }

        let usernames = handles.join(",");
        let query = [
            ("usernames", usernames.as_str()),
            ("user.fields", USER_FIELDS),
        ];
        let response: ApiResponse<Vec<UserData>> = self
            .get(Endpoint::UsersLookup, "/2/users/by", Subject::None, &query)
            .await?;

        // Unknown or suspended handles come back as per-item problems.
        for problem in &response.errors {
            warn!(
                "Could not look up @{}: {}",
                problem.value.as_deref().unwrap_or("?"),
                problem.describe()
            );
        }

        let users = response.data.unwrap_or_default();
        info!("Resolved {} of {} handles", users.len(), handles.len());
        Ok(users.into_iter().map(Account::from).collect())
    }

    async fn get_recent_posts(
        &self,
        account_id: &str,
        since: Option<&str>,
        max_results: u32,
    ) -> Result<Vec<Post>> {
        let path = format!("/2/users/{}/tweets", account_id);
        let max_results = max_results.clamp(5, 100).to_string();
        let mut query = vec![
            ("max_results", max_results.as_str()),
            ("tweet.fields", TWEET_FIELDS),
        ];
        if let Some(since_id) = since {
            query.push(("since_id", since_id));
        }

        let subject = Subject::User(account_id);
        let response: ApiResponse<Vec<TweetData>> = self
            .get(Endpoint::UserPosts, &path, subject, &query)
            .await?;

        // An empty timeline has neither data nor errors.
        if response.data.is_none() && !response.errors.is_empty() {
            return Err(problem_error(&response.errors, &path, subject));
        }

        let posts = response
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|tweet| tweet.into_post(account_id))
            .collect::<Result<Vec<_>>>()?;

        debug!("Retrieved {} posts for account {}", posts.len(), account_id);
        Ok(posts)
    }
}

fn into_page<T>(
    response: ApiResponse<Vec<T>>,
    path: &str,
    subject: Subject<'_>,
) -> Result<(Vec<T>, Option<String>)> {
    match response.data {
        Some(items) => Ok((items, response.meta.and_then(|m| m.next_token))),
        None if !response.errors.is_empty() => {
            Err(problem_error(&response.errors, path, subject))
        }
        None => Ok((Vec::new(), None)),
    }
}

fn problem_error(problems: &[ApiProblem], path: &str, subject: Subject<'_>) -> CoreError {
    let error = match problems.first() {
        Some(problem) if problem.is_not_found() => subject.not_found(path),
        Some(problem) if problem.is_not_authorized() => TwitterApiError::Forbidden {
            resource: path.to_string(),
        },
        Some(problem) => TwitterApiError::InvalidResponse {
            details: problem.describe(),
        },
        None => TwitterApiError::InvalidResponse {
            details: format!("Empty response for {}", path),
        },
    };
    CoreError::TwitterApi(error)
}

fn error_for_status(
    status: StatusCode,
    reset: Option<i64>,
    body: &str,
    path: &str,
    subject: Subject<'_>,
) -> CoreError {
    error!("Request failed with status: {} for {}", status, path);
    let body = ErrorBody::parse(body);

    let error = match status.as_u16() {
        429 => {
            let retry_after = retry_after_from_reset(reset, Utc::now().timestamp());
            warn!("Rate limited on {}, retry after {} seconds", path, retry_after);
            TwitterApiError::RateLimitExceeded { retry_after }
        }
        401 => TwitterApiError::InvalidToken,
        403 => TwitterApiError::Forbidden {
            resource: path.to_string(),
        },
        400 if body.is_not_found() => subject.not_found(path),
        400 => TwitterApiError::InvalidRequest {
            details: format!("{}: {}", path, body.describe()),
        },
        404 => subject.not_found(path),
        code if status.is_server_error() => TwitterApiError::ServerError { status_code: code },
        code => TwitterApiError::InvalidResponse {
            details: format!("Unexpected status {} for {}", code, path),
        },
    };
    CoreError::TwitterApi(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TwitterApiClient {
        TwitterApiClient::new(&ApiConfig::default(), "AAAA".to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_api_client_creation() {
        let client = client();
        assert_eq!(client.base_url.as_str(), "https://api.twitter.com/");
        assert_eq!(client.get_metrics().await.total_requests, 0);

    }

    #[test]
    fn test_invalid_base_url() {
        let config = ApiConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        let result = TwitterApiClient::new(&config, "AAAA".to_string());
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_timeline_response_parsing() {
        let body = r#"{
            "data": [
                {"id": "1460323737035677698", "text": "Introducing a new era", "author_id": "2244994945", "created_at": "2021-11-15T19:08:05.000Z"},
                {"id": "1460323737035677697", "text": "older", "created_at": "2021-11-15T19:08:04.000Z"}
            ],
            "meta": {"result_count": 2, "newest_id": "1460323737035677698", "oldest_id": "1460323737035677697"}
        }"#;
        let response: ApiResponse<Vec<TweetData>> = serde_json::from_str(body).unwrap();
        let posts: Vec<Post> = response
            .data
            .unwrap()
            .into_iter()
            .map(|t| t.into_post("2244994945").unwrap())
            .collect();

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].author_id, "2244994945");
        // Missing author_id falls back to the polled account.
        assert_eq!(posts[1].author_id, "2244994945");
        assert_eq!(posts[1].text, "older");
    }

    #[test]
    fn test_empty_timeline_has_no_data() {
        let body = r#"{"meta": {"result_count": 0}}"#;
        let response: ApiResponse<Vec<TweetData>> = serde_json::from_str(body).unwrap();
        assert!(response.data.is_none());
        assert!(response.errors.is_empty());
    }

    #[test]
    fn test_problem_mapping() {
        let body = r#"{
            "errors": [{
                "value": "123",
                "detail": "Could not find user with id: [123].",
                "title": "Not Found Error",
                "resource_type": "user",
                "type": "https://api.twitter.com/2/problems/resource-not-found"
            }]
        }"#;
        let response: ApiResponse<Vec<UserData>> = serde_json::from_str(body).unwrap();
        let result = into_page(response, "/2/users/123/following", Subject::User("123"));
        assert!(matches!(
            result,
            Err(CoreError::TwitterApi(TwitterApiError::UserNotFound { user_id })) if user_id == "123"
        ));

        let forbidden = ApiProblem {
            title: Some("Authorization Error".to_string()),
            problem_type: Some(
                "https://api.twitter.com/2/problems/not-authorized-for-resource".to_string(),
            ),
            resource_type: Some("user".to_string()),
            value: Some("9".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            problem_error(&[forbidden], "/2/users/9/tweets", Subject::User("9")),
            CoreError::TwitterApi(TwitterApiError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_page_carries_next_token() {
        let body = r#"{
            "data": [{"id": "6253282", "name": "Twitter API", "username": "TwitterAPI"}],
            "meta": {"result_count": 1, "next_token": "DFEDBNRFT3MHCZZZ"}
        }"#;
        let response: ApiResponse<Vec<UserData>> = serde_json::from_str(body).unwrap();
        let (items, next) = into_page(response, "/2/lists/1/members", Subject::List("1")).unwrap();

        assert_eq!(next.as_deref(), Some("DFEDBNRFT3MHCZZZ"));
        let account = Account::from(items.into_iter().next().unwrap());
        assert_eq!(account.display_name, "Twitter API");
        assert_eq!(account.username.as_deref(), Some("TwitterAPI"));
    }

    const INVALID_REQUEST_BODY: &str = r#"{
        "errors": [{
            "parameters": {"max_results": ["1000"]},
            "message": "The `max_results` query parameter value [1000] is not between 1 and 100"
        }],
        "title": "Invalid Request",
        "detail": "One or more parameters to your request was invalid.",
        "type": "https://api.twitter.com/2/problems/invalid-request"
    }"#;

    #[test]
    fn test_bad_request_is_not_a_missing_resource() {
        let error = error_for_status(
            StatusCode::BAD_REQUEST,
            None,
            INVALID_REQUEST_BODY,
            "/2/lists/84839422/members",
            Subject::List("84839422"),
        );

        match error {
            CoreError::TwitterApi(TwitterApiError::InvalidRequest { details }) => {
                assert!(details.contains("not between 1 and 100"));
            }
            other => panic!("Expected InvalidRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_not_found_statuses() {
        let not_found_body = r#"{
            "title": "Not Found Error",
            "type": "https://api.twitter.com/2/problems/resource-not-found"
        }"#;
        assert!(matches!(
            error_for_status(
                StatusCode::BAD_REQUEST,
                None,
                not_found_body,
                "/2/lists/1/members",
                Subject::List("1"),
            ),
            CoreError::TwitterApi(TwitterApiError::ListNotFound { list_id }) if list_id == "1"
        ));
        assert!(matches!(
            error_for_status(
                StatusCode::NOT_FOUND,
                None,
                "",
                "/2/users/7/following",
                Subject::User("7"),
            ),
            CoreError::TwitterApi(TwitterApiError::UserNotFound { user_id }) if user_id == "7"
        ));
    }

    #[test]
    fn test_rate_limit_status_uses_reset_header() {
        let reset = Utc::now().timestamp() + 120;
        match error_for_status(
            StatusCode::TOO_MANY_REQUESTS,
            Some(reset),
            "",
            "/2/users/1/tweets",
            Subject::User("1"),
        ) {
            CoreError::TwitterApi(TwitterApiError::RateLimitExceeded { retry_after }) => {
                assert!((118..=120).contains(&retry_after));
            }
            other => panic!("Expected RateLimitExceeded, got {:?}", other),
        }
    }

    /// Serves one canned HTTP response on a local port and hands back the
    /// request line it received.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (TwitterApiClient, tokio::task::JoinHandle<String>) {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;

            String::from_utf8_lossy(&request)
                .lines()
                .next()
                .unwrap_or_default()
                .to_string()
        });

        let config = ApiConfig {
            base_url: format!("http://{}", addr),
            ..Default::default()
        };
        let client = TwitterApiClient::new(&config, "AAAA".to_string()).unwrap();
        (client, server)
    }

    const EMPTY_PAGE: &str = r#"{"meta": {"result_count": 0}}"#;

    #[tokio::test]
    async fn test_list_members_request_stays_within_page_limit() {
        let (client, server) = serve_once("200 OK", EMPTY_PAGE).await;

        let page = client.get_list_members("84839422", None).await.unwrap();
        let request_line = server.await.unwrap();

        assert!(page.items.is_empty());
        assert!(
            request_line.starts_with("GET /2/lists/84839422/members?max_results=100&"),
            "{}",
            request_line
        );
    }

    #[tokio::test]
    async fn test_followees_request_uses_large_pages() {
        let (client, server) = serve_once("200 OK", EMPTY_PAGE).await;

        client.get_followees("2244994945", Some("TOKEN1")).await.unwrap();
        let request_line = server.await.unwrap();

        assert!(request_line.starts_with("GET /2/users/2244994945/following?max_results=1000&"));
        assert!(request_line.contains("pagination_token=TOKEN1"));
    }

    #[tokio::test]
    async fn test_owned_lists_and_timeline_requests() {
        let (client, server) = serve_once("200 OK", EMPTY_PAGE).await;
        client.get_owned_lists("783214", None).await.unwrap();
        assert!(server
            .await
            .unwrap()
            .starts_with("GET /2/users/783214/owned_lists?max_results=100"));

        let (client, server) = serve_once("200 OK", EMPTY_PAGE).await;
        let posts = client.get_recent_posts("783214", Some("1500"), 500).await.unwrap();
        let request_line = server.await.unwrap();

        assert!(posts.is_empty());
        assert!(request_line.starts_with("GET /2/users/783214/tweets?max_results=100&"));
        assert!(request_line.contains("since_id=1500"));
    }

    #[tokio::test]
    async fn test_rejected_list_request_is_reported_as_such() {
        let (client, server) = serve_once("400 Bad Request", INVALID_REQUEST_BODY).await;

        let result = client.get_list_members("84839422", None).await;
        server.await.unwrap();

        assert!(matches!(
            result,
            Err(CoreError::TwitterApi(TwitterApiError::InvalidRequest { .. }))
        ));
        let metrics = client.get_metrics().await;
        assert_eq!(metrics.failed_requests, 1);
    }

    #[tokio::test]
    async fn test_oversized_lookup_is_rejected() {
        let handles: Vec<String> = (0..101).map(|i| format!("user{}", i)).collect();
        let result = client().lookup_users(&handles).await;
        assert!(matches!(result, Err(CoreError::Internal { .. })));
    }
}
