use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use tweetfeed_core::{elapsed_between, to_chrono, Clock, RateLimitsConfig};

/// Groups of endpoints that share one platform rate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    Followees,
    ListMembers,
    OwnedLists,
    UsersLookup,
    UserPosts,
}

impl Endpoint {
    pub const ALL: [Endpoint; 5] = [
        Endpoint::Followees,
        Endpoint::ListMembers,
        Endpoint::OwnedLists,
        Endpoint::UsersLookup,
        Endpoint::UserPosts,
    ];

    fn index(self) -> usize {
        match self {
            Endpoint::Followees => 0,
            Endpoint::ListMembers => 1,
            Endpoint::OwnedLists => 2,
            Endpoint::UsersLookup => 3,
            Endpoint::UserPosts => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Followees => "followees",
            Endpoint::ListMembers => "list_members",
            Endpoint::OwnedLists => "owned_lists",
            Endpoint::UsersLookup => "users_lookup",
            Endpoint::UserPosts => "user_posts",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub time_window: Duration,
}

impl RateLimitConfig {
    pub fn for_endpoint(endpoint: Endpoint, limits: &RateLimitsConfig) -> Self {
        let max_requests = match endpoint {
            Endpoint::Followees => limits.followees_per_window,
            Endpoint::ListMembers => limits.list_members_per_window,
            Endpoint::OwnedLists => limits.owned_lists_per_window,
            Endpoint::UsersLookup => limits.users_lookup_per_window,
            Endpoint::UserPosts => limits.user_posts_per_window,
        };
        Self {
            max_requests,
            time_window: limits.window_length(),
        }
    }
}

/// Call accounting for one endpoint family.
///
/// Remembers the time of every call still inside the window, so no
/// `window_length` interval ever holds more than `call_budget` permitted
/// calls, including intervals straddling a reset. The oldest remembered call
/// is the window start; it expires once `now - window_start >= window_length`.
#[derive(Debug, Clone)]
pub struct RateWindow {
    window_length: Duration,
    call_budget: u32,
    calls: VecDeque<DateTime<Utc>>,
    blocked_until: Option<DateTime<Utc>>,
}

impl RateWindow {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            window_length: config.time_window,
            call_budget: config.max_requests,
            calls: VecDeque::with_capacity(config.max_requests as usize),
            blocked_until: None,
        }
    }

    /// Returns zero and records the call if one is permitted at `now`,
    /// otherwise the wait until a slot frees up. Nothing is recorded on a wait.
    pub fn reserve(&mut self, now: DateTime<Utc>) -> Duration {
        if let Some(until) = self.blocked_until {
            if now < until {
                return elapsed_between(now, until);
            }
            self.blocked_until = None;
        }

        self.expire(now);

        if (self.calls.len() as u32) < self.call_budget {
            self.calls.push_back(now);
            return Duration::ZERO;
        }

        match self.calls.front() {
            Some(oldest) => elapsed_between(now, *oldest + to_chrono(self.window_length)),
            // Zero budget: nothing is ever permitted, wait a whole window.
            None => self.window_length,
        }
    }

    /// Marks the window as used up until `now + retry_after`.
    pub fn exhaust(&mut self, now: DateTime<Utc>, retry_after: Duration) {
        let until = now + to_chrono(retry_after);
        self.blocked_until = Some(match self.blocked_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }

    pub fn calls_used(&self, now: DateTime<Utc>) -> u32 {
        let cutoff = now - to_chrono(self.window_length);
        self.calls.iter().filter(|t| **t > cutoff).count() as u32
    }

    pub fn window_start(&self) -> Option<DateTime<Utc>> {
        self.calls.front().copied()
    }

    pub fn call_budget(&self) -> u32 {
        self.call_budget
    }

    pub fn window_length(&self) -> Duration {
        self.window_length
    }

    fn expire(&mut self, now: DateTime<Utc>) {
        while let Some(oldest) = self.calls.front() {
            if elapsed_between(*oldest, now) >= self.window_length {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }
}

/// The platform call budget for this process: one [`RateWindow`] per
/// endpoint family, read against an injected clock.
pub struct RateBudget {
    clock: Arc<dyn Clock>,
    windows: [RateWindow; 5],
}

impl RateBudget {
    pub fn new(limits: &RateLimitsConfig, clock: Arc<dyn Clock>) -> Self {
        let windows = Endpoint::ALL
            .map(|endpoint| RateWindow::new(&RateLimitConfig::for_endpoint(endpoint, limits)));

        Self { clock, windows }
    }

    /// Zero when a call to `endpoint` may be issued now (and counts it),
    /// otherwise how long to wait before asking again.
    pub fn reserve(&mut self, endpoint: Endpoint) -> Duration {
        let now = self.clock.now();
        let wait = self.window_mut(endpoint).reserve(now);
        if !wait.is_zero() {
            debug!("Rate budget for {} exhausted, next slot in {:?}", endpoint, wait);
        }
        wait
    }

    /// Called when the platform answers 429 despite our accounting.
    pub fn exhaust(&mut self, endpoint: Endpoint, retry_after: Duration) {
        warn!(
            "Platform rate limit hit on {}, holding calls for {:?}",
            endpoint, retry_after
        );
        let now = self.clock.now();
        self.window_mut(endpoint).exhaust(now, retry_after);
    }

    pub fn status(&self, endpoint: Endpoint) -> RateLimitStatus {
        let now = self.clock.now();
        let window = &self.windows[endpoint.index()];
        let calls_used = window.calls_used(now);
        let resets_in = match (window.blocked_until, window.window_start()) {
            (Some(until), _) if until > now => elapsed_between(now, until),
            (_, Some(start)) => elapsed_between(now, start + to_chrono(window.window_length)),
            (_, None) => Duration::ZERO,
        };

        RateLimitStatus {
            endpoint,
            calls_used,
            call_budget: window.call_budget,
            window_length: window.window_length,
            window_start: window.window_start(),
            resets_in,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn window_length(&self, endpoint: Endpoint) -> Duration {
        self.windows[endpoint.index()].window_length
    }

    pub fn call_budget(&self, endpoint: Endpoint) -> u32 {
        self.windows[endpoint.index()].call_budget
    }

    /// Expected time to make `num_items` calls to `endpoint` from a fresh budget.
    pub fn estimate_for(&self, endpoint: Endpoint, num_items: usize) -> Duration {
        let window = &self.windows[endpoint.index()];
        estimate_total_duration(num_items, window.call_budget, window.window_length)
    }

    fn window_mut(&mut self, endpoint: Endpoint) -> &mut RateWindow {
        &mut self.windows[endpoint.index()]
    }
}

/// `ceil(num_items / budget_per_window)` whole windows.
pub fn estimate_total_duration(
    num_items: usize,
    budget_per_window: u32,
    window_length: Duration,
) -> Duration {
    let budget = budget_per_window.max(1) as usize;
    let windows = num_items.div_ceil(budget);
    window_length * windows as u32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub endpoint: Endpoint,
    pub calls_used: u32,
    pub call_budget: u32,
    pub window_length: Duration,
    pub window_start: Option<DateTime<Utc>>,
    pub resets_in: Duration,
}

impl RateLimitStatus {
    pub fn requests_remaining_in_window(&self) -> u32 {
        self.call_budget.saturating_sub(self.calls_used)
    }

    pub fn utilization_percentage(&self) -> f64 {
        if self.call_budget == 0 {
            return 100.0;
        }
        (self.calls_used as f64 / self.call_budget as f64) * 100.0
    }

    pub fn is_near_limit(&self) -> bool {
        self.utilization_percentage() > 80.0
    }
}
