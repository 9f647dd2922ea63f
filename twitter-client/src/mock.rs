//! In-memory [`TwitterApi`] for tests.
//!
//! Listings are scripted as pages, timelines as the full set of an account's
//! posts (filtered by `since` on every call), and failures either as one-shot
//! errors (per endpoint, or per account for timelines) or as permanent ones. Every call is recorded for later assertions.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::rate_limiter::Endpoint;
use crate::TwitterApi;
use tweetfeed_core::{
    compare_ids, Account, CoreError, OwnedList, Page, Post, Result, TwitterApiError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Followees {
        account_id: String,
        page_token: Option<String>,
    },
    ListMembers {
        list_id: String,
        page_token: Option<String>,
    },
    OwnedLists {
        owner_id: String,
        page_token: Option<String>,
    },
    LookupUsers {
        handles: Vec<String>,
    },
    RecentPosts {
        account_id: String,
        since: Option<String>,
    },
}

impl MockCall {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            MockCall::Followees { .. } => Endpoint::Followees,
            MockCall::ListMembers { .. } => Endpoint::ListMembers,
            MockCall::OwnedLists { .. } => Endpoint::OwnedLists,
            MockCall::LookupUsers { .. } => Endpoint::UsersLookup,
            MockCall::RecentPosts { .. } => Endpoint::UserPosts,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    followees: HashMap<String, Vec<Vec<Account>>>,
    list_members: HashMap<String, Vec<Vec<Account>>>,
    owned_lists: HashMap<String, Vec<Vec<OwnedList>>>,
    users_by_handle: HashMap<String, Account>,
    posts: HashMap<String, Vec<Post>>,
    next_failures: HashMap<Endpoint, VecDeque<TwitterApiError>>,
    next_post_failures: HashMap<String, VecDeque<TwitterApiError>>,
    permanent_post_failures: HashMap<String, TwitterApiError>,
    calls: Vec<MockCall>,
}

#[derive(Debug, Default)]
pub struct MockTwitterApi {
    state: Mutex<MockState>,
}

impl MockTwitterApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Followees of `account_id`, served one inner `Vec` per page.
    pub fn with_followees(self, account_id: &str, pages: Vec<Vec<Account>>) -> Self {
        self.state().followees.insert(account_id.to_string(), pages);
        self
    }

    pub fn with_list_members(self, list_id: &str, pages: Vec<Vec<Account>>) -> Self {
        self.state()
            .list_members
            .insert(list_id.to_string(), pages);
        self
    }

    pub fn with_owned_lists(self, owner_id: &str, pages: Vec<Vec<OwnedList>>) -> Self {
        self.state().owned_lists.insert(owner_id.to_string(), pages);
        self
    }

    /// Makes `account` resolvable by its username.
    pub fn with_user(self, account: Account) -> Self {
        if let Some(username) = &account.username {
            self.state()
                .users_by_handle
                .insert(username.to_lowercase(), account.clone());
        }
        self
    }

    pub fn with_posts(self, account_id: &str, posts: Vec<Post>) -> Self {
        for post in posts {
            self.push_post(account_id, post);
        }
        self
    }

    /// Publishes a post; it shows up on the next timeline call.
    pub fn push_post(&self, account_id: &str, post: Post) {
        self.state()
            .posts
            .entry(account_id.to_string())
            .or_default()
            .push(post);
    }

    /// The next call to `endpoint` fails with `error`. Queued failures are
    /// served in order before any scripted data.
    pub fn fail_next(&self, endpoint: Endpoint, error: TwitterApiError) {
        self.state()
            .next_failures
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    /// The next timeline call for `account_id` fails with `error`.
    pub fn fail_next_posts(&self, account_id: &str, error: TwitterApiError) {
        self.state()
            .next_post_failures
            .entry(account_id.to_string())
            .or_default()
            .push_back(error);
    }

    /// Every timeline call for `account_id` fails with `error`.
    pub fn fail_posts_always(&self, account_id: &str, error: TwitterApiError) {
        self.state()
            .permanent_post_failures
            .insert(account_id.to_string(), error);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.endpoint() == endpoint)
            .count()
    }

    /// Timeline calls made for one account, with the cursor each carried.
    pub fn post_calls_for(&self, account_id: &str) -> Vec<Option<String>> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                MockCall::RecentPosts {
                    account_id: id,
                    since,
                } if id == account_id => Some(since.clone()),
                _ => None,
            })
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records `call` and pops the failure queued for its endpoint, if any.
    fn record(&self, call: MockCall) -> Result<()> {
        let mut state = self.state();
        let endpoint = call.endpoint();
        state.calls.push(call);
        match state
            .next_failures
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(CoreError::TwitterApi(error)),
            None => Ok(()),
        }
    }
}

fn page_of<T: Clone>(pages: &[Vec<T>], page_token: Option<&str>) -> Result<Page<T>> {
    let index = match page_token {
        None => 0,
        Some(token) => token.parse::<usize>().map_err(|_| {
            CoreError::TwitterApi(TwitterApiError::InvalidResponse {
                details: format!("Unknown pagination token {}", token),
            })
        })?,
    };

    let items = pages.get(index).cloned().unwrap_or_default();
    if index + 1 < pages.len() {
        Ok(Page::with_next(items, (index + 1).to_string()))
    } else {
        Ok(Page::last(items))
    }
}

#[async_trait]
impl TwitterApi for MockTwitterApi {
    async fn get_followees(
        &self,
        account_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<Account>> {
        self.record(MockCall::Followees {
            account_id: account_id.to_string(),
            page_token: page_token.map(str::to_string),
        })?;

        match self.state().followees.get(account_id) {
            Some(pages) => page_of(pages, page_token),
            None => Err(CoreError::TwitterApi(TwitterApiError::UserNotFound {
                user_id: account_id.to_string(),
            })),
        }
    }

    async fn get_list_members(
        &self,
        list_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<Account>> {
        self.record(MockCall::ListMembers {
            list_id: list_id.to_string(),
            page_token: page_token.map(str::to_string),
        })?;

        match self.state().list_members.get(list_id) {
            Some(pages) => page_of(pages, page_token),
            None => Err(CoreError::TwitterApi(TwitterApiError::ListNotFound {
                list_id: list_id.to_string(),
            })),
        }
    }

    async fn get_owned_lists(
        &self,
        owner_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page<OwnedList>> {
        self.record(MockCall::OwnedLists {
            owner_id: owner_id.to_string(),
            page_token: page_token.map(str::to_string),
        })?;

        match self.state().owned_lists.get(owner_id) {
            Some(pages) => page_of(pages, page_token),
            None => Ok(Page::last(Vec::new())),
        }
    }

    async fn lookup_users(&self, handles: &[String]) -> Result<Vec<Account>> {
        self.record(MockCall::LookupUsers {
            handles: handles.to_vec(),
        })?;

        let state = self.state();
        Ok(handles
            .iter()
            .filter_map(|handle| state.users_by_handle.get(&handle.to_lowercase()))
            .cloned()
            .collect())
    }

    async fn get_recent_posts(
        &self,
        account_id: &str,
        since: Option<&str>,
        max_results: u32,
    ) -> Result<Vec<Post>> {
        self.record(MockCall::RecentPosts {
            account_id: account_id.to_string(),
            since: since.map(str::to_string),
        })?;

        let mut state = self.state();
        if let Some(error) = state
            .next_post_failures
            .get_mut(account_id)
            .and_then(VecDeque::pop_front)
        {
            return Err(CoreError::TwitterApi(error));
        }
        if let Some(error) = state.permanent_post_failures.get(account_id) {
            return Err(CoreError::TwitterApi(error.clone()));
        }

        let mut posts: Vec<Post> = state
            .posts
            .get(account_id)
            .map(|posts| {
                posts
                    .iter()
                    .filter(|post| match since {
                        Some(since) => compare_ids(&post.id, since) == Ordering::Greater,
                        None => true,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // Newest first, like the platform's timeline.
        posts.sort_by(|a, b| Post::chronological(b, a));
        posts.truncate(max_results as usize);
        Ok(posts)
    }
}
