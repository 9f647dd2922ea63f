use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};
use tweetfeed_core::{CoreError, ManualClock, Result};
use twitter_client::{Endpoint, RateBudget, RateLimitStatus};

/// Timed suspension, swappable so tests never really sleep.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that moves a [`ManualClock`] forward instead of waiting, and
/// remembers every requested duration.
#[derive(Debug, Clone, Default)]
pub struct ManualSleeper {
    clock: ManualClock,
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl ManualSleeper {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            slept: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Sleeper for ManualSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
        self.clock.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Gate in front of every platform call: owns the [`RateBudget`], sleeps
/// through exhausted windows and gives up as soon as shutdown is signalled.
pub struct Pacer {
    budget: RateBudget,
    sleeper: Arc<dyn Sleeper>,
    shutdown: watch::Receiver<bool>,
}

impl Pacer {
    pub fn new(
        budget: RateBudget,
        sleeper: Arc<dyn Sleeper>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            budget,
            sleeper,
            shutdown,
        }
    }

    /// Waits until one call to `endpoint` fits in its window and charges it.
    pub async fn acquire(&mut self, endpoint: Endpoint) -> Result<()> {
        loop {
            if self.is_cancelled() {
                return Err(CoreError::Interrupted);
            }

            let wait = self.budget.reserve(endpoint);
            if wait.is_zero() {
                return Ok(());
            }

            info!(
                "Call budget for {} used up, waiting {}s for the window to reopen",
                endpoint,
                wait.as_secs()
            );
            self.pause(wait).await?;
        }
    }

    /// Charges one call to `endpoint` if it fits right now, otherwise returns
    /// the wait without sleeping.
    pub fn try_reserve(&mut self, endpoint: Endpoint) -> Duration {
        self.budget.reserve(endpoint)
    }

    /// Sleeps for `duration` unless shutdown arrives first.
    pub async fn pause(&mut self, duration: Duration) -> Result<()> {
        if self.is_cancelled() {
            return Err(CoreError::Interrupted);
        }

        debug!("Sleeping for {:?}", duration);
        let sleeper = Arc::clone(&self.sleeper);
        tokio::select! {
            _ = sleeper.sleep(duration) => Ok(()),
            _ = wait_for_shutdown(&mut self.shutdown) => {
                debug!("Shutdown requested while sleeping");
                Err(CoreError::Interrupted)
            }
        }
    }

    /// Records a 429 from the platform against `endpoint`.
    pub fn exhaust(&mut self, endpoint: Endpoint, retry_after: Duration) {
        self.budget.exhaust(endpoint, retry_after);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn status(&self, endpoint: Endpoint) -> RateLimitStatus {
        self.budget.status(endpoint)
    }

    pub fn budget(&self) -> &RateBudget {
        &self.budget
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        // A dropped sender can never ask for shutdown.
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
