//! The polling loop.
//!
//! [`PollScheduler`] walks the target accounts in order, one timeline call
//! each, and turns what it finds into a lazy stream of [`MatchedPost`]s. It is
//! an explicit state machine so every transition, and the only two places it
//! suspends (budget waits and the idle sleep), are visible in one `match`.

use chrono::{DateTime, Utc};
use futures::stream::{self, Stream};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tweetfeed_core::{
    compare_ids, elapsed_between, to_chrono, Account, Clock, CoreError, KeywordExpression,
    MatchedPost, PollingConfig, Post, TargetSet,
};
use twitter_client::{classify, Endpoint, FailureClass, TwitterApi};

use crate::pacer::Pacer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Polling(usize),
    Filtering { index: usize, posts: Vec<Post> },
    Emitting { index: usize },
    Waiting { until: DateTime<Utc>, resume: usize },
    Stopped,
}

enum Step {
    Emit(MatchedPost),
    Continue,
    Done,
}

/// Per-run counters, logged when the scheduler stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub cycles: u64,
    pub polls: u64,
    pub posts_seen: u64,
    pub emitted: u64,
    pub transient_failures: u64,
    pub excluded_accounts: u64,
}

#[derive(Debug)]
struct Target {
    account: Account,
    /// Newest post id seen so far.
    cursor: Option<String>,
    primed: bool,
    active: bool,
}

pub struct PollScheduler {
    api: Arc<dyn TwitterApi>,
    pacer: Pacer,
    keywords: KeywordExpression,
    targets: Vec<Target>,
    posts_per_page: u32,
    idle_interval: Duration,
    emit_backlog: bool,
    state: SchedulerState,
    pending: VecDeque<MatchedPost>,
    new_posts_this_cycle: u64,
    stats: PollStats,
}

impl PollScheduler {
    pub fn new(
        api: Arc<dyn TwitterApi>,
        pacer: Pacer,
        targets: TargetSet,
        keywords: KeywordExpression,
        polling: &PollingConfig,
    ) -> Self {
        let targets = targets
            .into_iter()
            .map(|account| Target {
                account,
                cursor: None,
                primed: false,
                active: true,
            })
            .collect();

        Self {
            api,
            pacer,
            keywords,
            targets,
            posts_per_page: polling.posts_per_page,
            idle_interval: polling.idle_interval(),
            emit_backlog: polling.emit_backlog,
            state: SchedulerState::Idle,
            pending: VecDeque::new(),
            new_posts_this_cycle: 0,
            stats: PollStats::default(),
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn stats(&self) -> PollStats {
        self.stats
    }

    pub fn cursor(&self, account_id: &str) -> Option<&str> {
        self.targets
            .iter()
            .find(|t| t.account.id == account_id)
            .and_then(|t| t.cursor.as_deref())
    }

    pub fn is_active(&self, account_id: &str) -> bool {
        self.targets
            .iter()
            .any(|t| t.account.id == account_id && t.active)
    }

    pub fn active_accounts(&self) -> usize {
        self.targets.iter().filter(|t| t.active).count()
    }

    /// Worst-case time to poll every active account once from a fresh budget.
    pub fn estimated_cycle_duration(&self) -> Duration {
        self.pacer
            .budget()
            .estimate_for(Endpoint::UserPosts, self.active_accounts())
    }

    /// Runs the state machine until it has a match to hand out, or stops.
    pub async fn next_match(&mut self) -> Option<MatchedPost> {
        loop {
            match self.step().await {
                Step::Emit(matched) => return Some(matched),
                Step::Continue => {}
                Step::Done => return None,
            }
        }
    }

    /// Polls the rest of the current cycle and returns its matches in
    /// emission order. A cycle that begins with the idle sleep sleeps first.
    pub async fn run_cycle(&mut self) -> Vec<MatchedPost> {
        let cycle = self.stats.cycles;
        let mut matches = Vec::new();
        loop {
            match self.step().await {
                Step::Emit(matched) => matches.push(matched),
                Step::Continue if self.stats.cycles == cycle => {}
                Step::Continue | Step::Done => return matches,
            }
        }
    }

    async fn step(&mut self) -> Step {
        let state = std::mem::replace(&mut self.state, SchedulerState::Stopped);
        self.state = match state {
            SchedulerState::Idle => {
                info!(
                    "Polling {} accounts for {}",
                    self.targets.len(),
                    self.keywords
                );
                self.start_cycle()
            }
            SchedulerState::Polling(index) => self.poll(index).await,
            SchedulerState::Filtering { index, posts } => self.filter(index, posts),
            SchedulerState::Emitting { index } => match self.pending.pop_front() {
                Some(matched) => {
                    self.stats.emitted += 1;
                    self.state = SchedulerState::Emitting { index };
                    return Step::Emit(matched);
                }
                None => self.advance(index),
            },
            SchedulerState::Waiting { until, resume } => {
                let wait = elapsed_between(self.pacer.budget().clock().now(), until);
                match self.pacer.pause(wait).await {
                    Ok(()) => SchedulerState::Polling(resume),
                    Err(_) => {
                        info!("Polling interrupted");
                        self.stop()
                    }
                }
            }
            SchedulerState::Stopped => return Step::Done,
        };
        Step::Continue
    }

    /// Turns the scheduler into an unbounded stream of matches. The stream
    /// ends on shutdown or once no account can be polled any more.
    pub fn into_feed(self) -> impl Stream<Item = MatchedPost> + Send {
        stream::unfold(self, |mut scheduler| async move {
            scheduler
                .next_match()
                .await
                .map(|matched| (matched, scheduler))
        })
    }

    fn start_cycle(&mut self) -> SchedulerState {
        self.new_posts_this_cycle = 0;
        match self.next_active(0) {
            Some(index) => SchedulerState::Polling(index),
            None => {
                warn!("No accounts left to poll");
                self.stop()
            }
        }
    }

    async fn poll(&mut self, index: usize) -> SchedulerState {
        if self.pacer.is_cancelled() {
            info!("Polling interrupted");
            return self.stop();
        }

        let wait = self.pacer.try_reserve(Endpoint::UserPosts);
        if !wait.is_zero() {
            let now = self.pacer.budget().clock().now();
            debug!(
                "Call budget for {} used up, waiting {}s",
                Endpoint::UserPosts,
                wait.as_secs()
            );
            return SchedulerState::Waiting {
                until: now + to_chrono(wait),
                resume: index,
            };
        }

        let target = &self.targets[index];
        let account_id = target.account.id.clone();
        let cursor = target.cursor.clone();
        self.stats.polls += 1;

        let result = self
            .api
            .get_recent_posts(&account_id, cursor.as_deref(), self.posts_per_page)
            .await;

        match result {
            Ok(posts) => SchedulerState::Filtering { index, posts },
            Err(error) => {
                self.handle_failure(index, error);
                self.advance(index)
            }
        }
    }

    fn filter(&mut self, index: usize, mut posts: Vec<Post>) -> SchedulerState {
        let target = &mut self.targets[index];

        // Anything at or behind the cursor was already seen.
        if let Some(cursor) = &target.cursor {
            posts.retain(|post| compare_ids(&post.id, cursor) == Ordering::Greater);
        }
        posts.sort_by(Post::chronological);

        if let Some(newest) = posts.iter().max_by(|a, b| compare_ids(&a.id, &b.id)) {
            target.cursor = Some(newest.id.clone());
        }

        let first_poll = !target.primed;
        target.primed = true;
        if first_poll && !self.emit_backlog {
            debug!(
                account_id = %target.account.id,
                "Starting cursor at {:?}, skipping {} existing posts",
                target.cursor,
                posts.len()
            );
            return self.advance(index);
        }

        self.stats.posts_seen += posts.len() as u64;
        self.new_posts_this_cycle += posts.len() as u64;

        let author = target.account.clone();
        for post in posts {
            if self.keywords.matches(&post.text) {
                self.pending.push_back(MatchedPost {
                    author: author.clone(),
                    post,
                });
            } else {
                debug!(account_id = %author.id, post_id = %post.id, "Post did not match");
            }
        }

        if self.pending.is_empty() {
            self.advance(index)
        } else {
            SchedulerState::Emitting { index }
        }
    }

    fn handle_failure(&mut self, index: usize, error: CoreError) {
        let target = &mut self.targets[index];
        let account = &target.account;

        match classify(&error) {
            FailureClass::Transient => {
                self.stats.transient_failures += 1;
                warn!(
                    account_id = %account.id,
                    "Polling {} failed, retrying next cycle: {}",
                    account.display_name,
                    error
                );
            }
            FailureClass::RateLimited(retry_after) => {
                self.stats.transient_failures += 1;
                warn!(
                    account_id = %account.id,
                    "Rate limited while polling {}, retrying next cycle",
                    account.display_name
                );
                self.pacer.exhaust(Endpoint::UserPosts, retry_after);
            }
            FailureClass::Permanent => {
                self.stats.excluded_accounts += 1;
                target.active = false;
                warn!(
                    account_id = %account.id,
                    "Excluding {} for the rest of the run: {}",
                    account.display_name,
                    error
                );
            }
        }
    }

    /// Moves past `index`: the next active account, or the end of the cycle.
    fn advance(&mut self, index: usize) -> SchedulerState {
        if let Some(next) = self.next_active(index + 1) {
            return SchedulerState::Polling(next);
        }

        self.stats.cycles += 1;
        if self.active_accounts() == 0 {
            warn!("Every account has been excluded");
            return self.stop();
        }

        let quiet = self.new_posts_this_cycle == 0;
        debug!(
            "Cycle {} done, {} new posts",
            self.stats.cycles, self.new_posts_this_cycle
        );
        match self.start_cycle() {
            SchedulerState::Polling(first) if quiet => SchedulerState::Waiting {
                until: self.pacer.budget().clock().now() + to_chrono(self.idle_interval),
                resume: first,
            },
            next => next,
        }
    }

    fn next_active(&self, from: usize) -> Option<usize> {
        (from..self.targets.len()).find(|&i| self.targets[i].active)
    }

    fn stop(&mut self) -> SchedulerState {
        let stats = self.stats;
        info!(
            cycles = stats.cycles,
            polls = stats.polls,
            posts_seen = stats.posts_seen,
            emitted = stats.emitted,
            transient_failures = stats.transient_failures,
            excluded_accounts = stats.excluded_accounts,
            "Polling stopped"
        );
        SchedulerState::Stopped
    }
}
