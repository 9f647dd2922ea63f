//! Turns a [`TargetSelector`] into the accounts to poll.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tweetfeed_core::{
    Account, ConfigError, CoreError, OwnedList, Page, Result, TargetSelector, TargetSet,
    ValidationError,
};
use twitter_client::api::LOOKUP_BATCH_SIZE;
use twitter_client::{classify, Endpoint, FailureClass, TwitterApi};

use crate::pacer::Pacer;

/// Wait after the first transient failure of a call; doubles per attempt.
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const UTF8_BOM: char = '\u{feff}';

/// Checks the selector before any API call is made.
pub fn validate_selector(
    selector: &TargetSelector,
    header_line_num: i64,
) -> std::result::Result<(), ValidationError> {
    if selector.value().is_empty() {
        return Err(ValidationError::EmptySelector {
            kind: selector.kind().to_string(),
        });
    }

    if let TargetSelector::FilePath(path) = selector {
        let path_ref = Path::new(path);
        if path_ref.extension().and_then(|e| e.to_str()) != Some("csv") {
            return Err(ValidationError::InvalidFileExtension { path: path.clone() });
        }
        if !path_ref.is_file() {
            return Err(ValidationError::FileNotFound { path: path.clone() });
        }
    }

    if header_line_num < 0 {
        return Err(ValidationError::NegativeHeaderLine {
            value: header_line_num,
        });
    }
    Ok(())
}

/// One non-header row of a following-user file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Numeric account id, or a handle without its `@`.
    pub value: String,
    pub display_name: Option<String>,
    pub line: usize,
}

impl FileEntry {
    pub fn is_account_id(&self) -> bool {
        self.value.chars().all(|c| c.is_ascii_digit())
    }
}

/// Reads the first (and optional second) column of every row except the
/// 1-indexed `header_line_num`; 0 means the file has no header.
pub fn read_accounts_file(path: &Path, header_line_num: usize) -> Result<Vec<FileEntry>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_accounts(&contents, header_line_num))
}

pub fn parse_accounts(contents: &str, header_line_num: usize) -> Vec<FileEntry> {
    let contents = contents.strip_prefix(UTF8_BOM).unwrap_or(contents);

    contents
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line))
        .filter(|(line_no, _)| *line_no != header_line_num)
        .filter_map(|(line_no, line)| {
            let mut fields = split_fields(line).into_iter();
            let value = fields.next()?;
            let value = value.strip_prefix('@').unwrap_or(&value).to_string();
            if value.is_empty() {
                return None;
            }
            let display_name = fields.next().filter(|name| !name.is_empty());
            Some(FileEntry {
                value,
                display_name,
                line: line_no,
            })
        })
        .collect()
}

/// Splits one line on commas, honouring double quotes and `""` escapes.
/// Fields come back trimmed and unquoted.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);

    fields
        .into_iter()
        .map(|f| f.trim().trim_matches('"').trim().to_string())
        .collect()
}

pub struct TargetResolver {
    api: Arc<dyn TwitterApi>,
    owner_user_id: Option<String>,
    header_line_num: usize,
}

impl TargetResolver {
    pub fn new(api: Arc<dyn TwitterApi>, owner_user_id: Option<String>) -> Self {
        Self {
            api,
            owner_user_id,
            header_line_num: 1,
        }
    }

    pub fn with_header_line(mut self, header_line_num: usize) -> Self {
        self.header_line_num = header_line_num;
        self
    }

    /// Resolves `selector` into an ordered, duplicate-free set of accounts.
    /// Every platform call goes through `pacer`.
    pub async fn resolve(&self, selector: &TargetSelector, pacer: &mut Pacer) -> Result<TargetSet> {
        info!("Resolving target accounts from {}", selector);

        let resolved = match selector {
            TargetSelector::AccountId(account_id) => {
                self.collect_accounts(AccountSource::Followees(account_id), pacer)
                    .await
            }
            TargetSelector::ListId(list_id) => {
                self.collect_accounts(AccountSource::ListMembers(list_id), pacer)
                    .await
            }
            TargetSelector::ListName(name) => match self.find_owned_list(name, pacer).await {
                Ok(list) => {
                    info!("List \"{}\" has id {}", list.name, list.id);
                    self.collect_accounts(AccountSource::ListMembers(&list.id), pacer)
                        .await
                }
                Err(e) => Err(e),
            },
            TargetSelector::FilePath(path) => self.accounts_from_file(Path::new(path), pacer).await,
        };

        let targets = resolved.map_err(|e| resolution_error(selector, e))?;
        info!("Resolved {} accounts from {}", targets.len(), selector);
        Ok(targets)
    }

    async fn collect_accounts(
        &self,
        source: AccountSource<'_>,
        pacer: &mut Pacer,
    ) -> Result<TargetSet> {
        let mut targets = TargetSet::new();
        let mut next_token: Option<String> = None;
        let mut pages = 0;

        loop {
            let token = next_token.as_deref();
            let page = call_with_retries(pacer, source.endpoint(), || {
                self.fetch_accounts(source, token)
            })
            .await?;
            pages += 1;

            let fetched = page.items.len();
            targets.extend(page.items);
            debug!(
                "Page {} of {}: {} accounts, {} unique so far",
                pages,
                source,
                fetched,
                targets.len()
            );

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        Ok(targets)
    }

    async fn fetch_accounts(
        &self,
        source: AccountSource<'_>,
        page_token: Option<&str>,
    ) -> Result<Page<Account>> {
        match source {
            AccountSource::Followees(id) => self.api.get_followees(id, page_token).await,
            AccountSource::ListMembers(id) => self.api.get_list_members(id, page_token).await,
        }
    }

    /// First owned list whose name matches exactly.
    async fn find_owned_list(&self, name: &str, pacer: &mut Pacer) -> Result<OwnedList> {
        let owner_id = self
            .owner_user_id
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField {
                field: "api.owner_user_id".to_string(),
            })?;

        let mut next_token: Option<String> = None;
        loop {
            let token = next_token.as_deref();
            let page = call_with_retries(pacer, Endpoint::OwnedLists, || {
                self.api.get_owned_lists(owner_id, token)
            })
            .await?;

            if let Some(list) = page.items.into_iter().find(|list| list.name == name) {
                return Ok(list);
            }

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        Err(CoreError::NotFound {
            resource: format!("list \"{}\" owned by {}", name, owner_id),
        })
    }

    async fn accounts_from_file(&self, path: &Path, pacer: &mut Pacer) -> Result<TargetSet> {
        let entries = read_accounts_file(path, self.header_line_num)?;
        debug!("Read {} entries from {}", entries.len(), path.display());

        let handles: Vec<String> = entries
            .iter()
            .filter(|entry| !entry.is_account_id())
            .map(|entry| entry.value.clone())
            .collect();

        let mut by_handle: HashMap<String, Account> = HashMap::new();
        for batch in handles.chunks(LOOKUP_BATCH_SIZE) {
            let found = call_with_retries(pacer, Endpoint::UsersLookup, || {
                self.api.lookup_users(batch)
            })
            .await?;
            for account in found {
                if let Some(username) = &account.username {
                    by_handle.insert(username.to_lowercase(), account.clone());
                }
            }
        }

        let mut targets = TargetSet::new();
        for entry in entries {
            let account = if entry.is_account_id() {
                match entry.display_name {
                    Some(name) => Account::new(entry.value, name),
                    None => Account::from_id(entry.value),
                }
            } else {
                match by_handle.get(&entry.value.to_lowercase()) {
                    Some(found) => {
                        let mut account = found.clone();
                        if let Some(name) = entry.display_name {
                            account.display_name = name;
                        }
                        account
                    }
                    None => {
                        warn!(
                            "Skipping unknown handle @{} on line {} of {}",
                            entry.value,
                            entry.line,
                            path.display()
                        );
                        continue;
                    }
                }
            };

            if !targets.push(account) {
                debug!("Duplicate entry on line {} ignored", entry.line);
            }
        }

        Ok(targets)
    }
}

#[derive(Debug, Clone, Copy)]
enum AccountSource<'a> {
    Followees(&'a str),
    ListMembers(&'a str),
}

impl AccountSource<'_> {
    fn endpoint(&self) -> Endpoint {
        match self {
            AccountSource::Followees(_) => Endpoint::Followees,
            AccountSource::ListMembers(_) => Endpoint::ListMembers,
        }
    }
}

impl std::fmt::Display for AccountSource<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountSource::Followees(id) => write!(f, "followees of {}", id),
            AccountSource::ListMembers(id) => write!(f, "members of list {}", id),
        }
    }
}

/// Paces `call` on `endpoint` until it succeeds. Transient failures back off
/// exponentially and 429s hold the endpoint's window; only a permanent
/// failure or shutdown ends the loop early.
async fn call_with_retries<T, F, Fut>(pacer: &mut Pacer, endpoint: Endpoint, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        pacer.acquire(endpoint).await?;

        let error = match call().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        attempt += 1;

        match classify(&error) {
            FailureClass::Permanent => return Err(error),
            FailureClass::RateLimited(retry_after) => {
                warn!(
                    "Attempt {} on {} was rate limited, holding the endpoint for {:?}",
                    attempt, endpoint, retry_after
                );
                pacer.exhaust(endpoint, retry_after);
            }
            FailureClass::Transient => {
                let backoff = backoff_for(attempt);
                warn!(
                    "Attempt {} on {} failed: {}, retrying in {:?}",
                    attempt, endpoint, error, backoff
                );
                pacer.pause(backoff).await?;
            }
        }
    }
}

fn backoff_for(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    INITIAL_BACKOFF.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Puts the selector in front of anything that ends resolution, except a
/// shutdown request.
fn resolution_error(selector: &TargetSelector, error: CoreError) -> CoreError {
    if matches!(error, CoreError::Interrupted | CoreError::Resolution { .. }) {
        return error;
    }

    let reason = match error {
        CoreError::TwitterApi(api_error) => api_error.to_string(),
        CoreError::Config(config_error) => config_error.to_string(),
        CoreError::NotFound { resource } => format!("{} not found", resource),
        other => other.to_string(),
    };
    CoreError::Resolution {
        selector: selector.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tweetfeed_core::TwitterApiError;

    #[test]
    fn test_validate_selector() {
        assert!(matches!(
            validate_selector(&TargetSelector::ListId(String::new()), 1),
            Err(ValidationError::EmptySelector { kind }) if kind == "list_id"
        ));
        assert!(matches!(
            validate_selector(&TargetSelector::FilePath("users.txt".to_string()), 1),
            Err(ValidationError::InvalidFileExtension { .. })
        ));
        assert!(matches!(
            validate_selector(&TargetSelector::FilePath("/no/such/users.csv".to_string()), 1),
            Err(ValidationError::FileNotFound { .. })
        ));
        assert_eq!(
            validate_selector(&TargetSelector::AccountId("42".to_string()), -1),
            Err(ValidationError::NegativeHeaderLine { value: -1 })
        );
        assert!(validate_selector(&TargetSelector::ListName("rust".to_string()), 0).is_ok());
    }

    #[test]
    fn test_validate_existing_csv() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "id").unwrap();
        let selector = TargetSelector::FilePath(file.path().display().to_string());
        assert!(validate_selector(&selector, 1).is_ok());
    }

    #[test]
    fn test_parse_accounts_skips_header() {
        let entries = parse_accounts("user_id,name\n1,One\n2,Two\n\n3\n4,Four\n", 1);
        let values: Vec<&str> = entries.iter().map(|e| e.value.as_str()).collect();
        assert_eq!(values, vec!["1", "2", "3", "4"]);
        assert_eq!(entries[0].display_name.as_deref(), Some("One"));
        assert_eq!(entries[2].display_name, None);
        assert_eq!(entries[3].line, 6);
    }

    #[test]
    fn test_parse_accounts_header_elsewhere_or_absent() {
        let entries = parse_accounts("# exported\nid\n10\n", 2);
        let values: Vec<&str> = entries.iter().map(|e| e.value.as_str()).collect();
        assert_eq!(values, vec!["# exported", "10"]);

        let entries = parse_accounts("10\n11\n", 0);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_parse_accounts_strips_bom_quotes_and_at() {
        let entries = parse_accounts("\u{feff}\"@TwitterDev\", \"Dev, Team\"\n  \"783214\"  \n", 0);
        assert_eq!(entries[0].value, "TwitterDev");
        assert_eq!(entries[0].display_name.as_deref(), Some("Dev, Team"));
        assert!(!entries[0].is_account_id());
        assert_eq!(entries[1].value, "783214");
        assert!(entries[1].is_account_id());
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let waits: Vec<u64> = (1..=7).map(|n| backoff_for(n).as_secs()).collect();
        assert_eq!(waits, vec![2, 4, 8, 16, 32, 60, 60]);
        assert_eq!(backoff_for(u32::MAX), MAX_BACKOFF);
    }

    #[test]
    fn test_resolution_error_keeps_selector() {
        let selector = TargetSelector::ListId("84839422".to_string());

        match resolution_error(
            &selector,
            CoreError::TwitterApi(TwitterApiError::ServerError { status_code: 503 }),
        ) {
            CoreError::Resolution { selector, reason } => {
                assert_eq!(selector, "list_id=84839422");
                assert_eq!(reason, "Server error: 503");
            }
            other => panic!("Expected Resolution error, got {:?}", other),
        }
        assert!(matches!(
            resolution_error(&selector, CoreError::Interrupted),
            CoreError::Interrupted
        ));
    }

    #[test]
    fn test_split_fields_escaped_quotes() {
        assert_eq!(
            split_fields(r#"1,"say ""hi""",x"#),
            vec!["1".to_string(), "say \"hi\"".to_string(), "x".to_string()]
        );
    }
}
