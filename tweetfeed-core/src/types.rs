use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// Which accounts to poll. Exactly one selector drives a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    /// Poll the followees of this account.
    AccountId(String),
    ListId(String),
    /// Name of a list owned by the configured owner account.
    ListName(String),
    /// Path to a csv file whose first column holds account ids or handles.
    FilePath(String),
}

impl TargetSelector {
    pub fn kind(&self) -> &'static str {
        match self {
            TargetSelector::AccountId(_) => "user_id_for_followees",
            TargetSelector::ListId(_) => "list_id",
            TargetSelector::ListName(_) => "list_name",
            TargetSelector::FilePath(_) => "following_user_file_path",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            TargetSelector::AccountId(v)
            | TargetSelector::ListId(v)
            | TargetSelector::ListName(v)
            | TargetSelector::FilePath(v) => v,
        }
    }
}

impl fmt::Display for TargetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind(), self.value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub display_name: String,
    pub username: Option<String>,
}

impl Account {
    /// An account known only by id; the id doubles as its display name.
    pub fn from_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            username: None,
        }
    }

    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.username {
            Some(username) => write!(f, "{} (@{})", self.display_name, username),
            None => write!(f, "{} ({})", self.display_name, self.id),
        }
    }
}

/// Ordered, duplicate-free accounts to poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSet {
    accounts: Vec<Account>,
}

impl TargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the account unless its id is already present. Returns whether it was added.
    pub fn push(&mut self, account: Account) -> bool {
        if self.contains(&account.id) {
            return false;
        }
        self.accounts.push(account);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.accounts.iter().any(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Account> {
        self.accounts.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Account> {
        self.accounts.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.accounts.iter().map(|a| a.id.as_str()).collect()
    }
}

impl FromIterator<Account> for TargetSet {
    fn from_iter<I: IntoIterator<Item = Account>>(iter: I) -> Self {
        let mut seen = HashSet::new();
        let accounts = iter
            .into_iter()
            .filter(|account| seen.insert(account.id.clone()))
            .collect();
        Self { accounts }
    }
}

impl Extend<Account> for TargetSet {
    fn extend<I: IntoIterator<Item = Account>>(&mut self, iter: I) {
        for account in iter {
            self.push(account);
        }
    }
}

impl IntoIterator for TargetSet {
    type Item = Account;
    type IntoIter = std::vec::IntoIter<Account>;

    fn into_iter(self) -> Self::IntoIter {
        self.accounts.into_iter()
    }
}

impl<'a> IntoIterator for &'a TargetSet {
    type Item = &'a Account;
    type IntoIter = std::slice::Iter<'a, Account>;

    fn into_iter(self) -> Self::IntoIter {
        self.accounts.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Oldest first: by creation time, then by id as an unsigned integer.
    pub fn chronological(a: &Post, b: &Post) -> Ordering {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| compare_ids(&a.id, &b.id))
    }
}

/// Compares numeric post ids without parsing them; shorter ids are older.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedList {
    pub id: String,
    pub name: String,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }

    pub fn with_next(items: Vec<T>, next_token: impl Into<String>) -> Self {
        Self {
            items,
            next_token: Some(next_token.into()),
        }
    }
}

/// A post that passed the keyword filter, paired with the account it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPost {
    pub author: Account,
    pub post: Post,
}
