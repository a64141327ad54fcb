//! Quota accounting and retry with exponential backoff for every remote call
//!
//! All remote traffic goes through one [`Governor`], so backoff state and
//! consumed budget reflect a single ordered call history.

use std::time::Duration;

use indicatif::ProgressBar;
use rand::Rng;

use crate::error::{CallError, HarvestError};

/// Remote operation kinds and their quota cost (YouTube Data API v3 units).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Search,
    ListComments,
    ListReplies,
}

impl Operation {
    pub const fn cost(self) -> u64 {
        match self {
            Self::Search => 100,
            Self::ListComments | Self::ListReplies => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::ListComments => "comments",
            Self::ListReplies => "replies",
        }
    }
}

/// Retry limits and backoff shape.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    /// Retries on rate-limit signals before declaring the quota exhausted
    pub rate_limit_attempts: u32,
    /// Retries on transient failures before giving up on the call
    pub transient_attempts: u32,
    /// Extra random wait as a fraction of the exponential wait (0.0 disables)
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            rate_limit_attempts: 5,
            transient_attempts: 3,
            jitter: 0.1,
        }
    }
}

impl BackoffPolicy {
    /// Exponential backoff: `min(base * 2^attempt, cap)`
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |d| d.min(self.cap))
    }

    fn jittered(&self, wait: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return wait;
        }
        let frac = rand::rng().random_range(0.0..=self.jitter.min(1.0));
        wait + wait.mul_f64(frac)
    }
}

/// Blocking delay seam (tests record waits instead of sleeping)
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Counters accumulated over a run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GovernorStats {
    /// Requests issued, including retries
    pub calls: u64,
    pub retries: u64,
    pub rate_limited: u64,
    /// Quota units consumed by successful calls
    pub units_used: u64,
}

/// Single choke point for remote calls.
pub struct Governor {
    policy: BackoffPolicy,
    budget: Option<u64>,
    stats: GovernorStats,
    exhausted: bool,
    sleeper: Box<dyn Sleeper + Send>,
    pb: ProgressBar,
}

impl std::fmt::Debug for Governor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Governor")
            .field("policy", &self.policy)
            .field("budget", &self.budget)
            .field("stats", &self.stats)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl Governor {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            budget: None,
            stats: GovernorStats::default(),
            exhausted: false,
            sleeper: Box::new(ThreadSleeper),
            pb: ProgressBar::hidden(),
        }
    }

    /// Cap total quota units this run may spend
    pub fn with_budget(mut self, budget: Option<u64>) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + Send + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Progress line that shows retry status while waiting
    pub fn attach_progress(&mut self, pb: &ProgressBar) {
        self.pb = pb.clone();
    }

    pub fn stats(&self) -> GovernorStats {
        self.stats
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Units left before the configured budget is hit
    pub fn remaining_budget(&self) -> Option<u64> {
        self.budget
            .map(|b| b.saturating_sub(self.stats.units_used))
    }

    /// Whether a quota exhaustion has already been surfaced this run
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Execute `attempt_fn` with quota accounting and retries.
    ///
    /// Rate-limit signals escalate to [`HarvestError::QuotaExceeded`] once
    /// retries run out, after which every call fails immediately. Transient
    /// failures escalate to [`HarvestError::Transient`]. Waits within one
    /// call never decrease and never exceed the policy cap.
    pub fn call<T>(
        &mut self,
        op: Operation,
        label: &str,
        mut attempt_fn: impl FnMut() -> Result<T, CallError>,
    ) -> Result<T, HarvestError> {
        if self.exhausted {
            return Err(HarvestError::QuotaExceeded(
                "quota exhausted earlier in this run".to_string(),
            ));
        }
        if let Some(budget) = self.budget {
            if self.stats.units_used + op.cost() > budget {
                self.exhausted = true;
                log::error!(
                    "{label}: {} would exceed run budget ({}/{budget} units used)",
                    op.name(),
                    self.stats.units_used
                );
                return Err(HarvestError::QuotaExceeded(format!(
                    "run budget of {budget} units spent"
                )));
            }
        }

        let max_rate = self.policy.rate_limit_attempts;
        let max_transient = self.policy.transient_attempts;
        let mut rate_attempt = 0u32;
        let mut transient_attempt = 0u32;
        let mut last_wait = Duration::ZERO;

        loop {
            self.stats.calls += 1;
            match attempt_fn() {
                Ok(v) => {
                    self.stats.units_used += op.cost();
                    return Ok(v);
                }
                Err(CallError::RateLimited(msg)) => {
                    self.stats.rate_limited += 1;
                    if rate_attempt >= max_rate {
                        self.exhausted = true;
                        log::error!("{label}: still rate limited after {max_rate} retries: {msg}");
                        return Err(HarvestError::QuotaExceeded(msg));
                    }
                    rate_attempt += 1;
                    last_wait = self.next_wait(rate_attempt, last_wait);
                    self.pb
                        .set_message(format!("rate limited, retry {rate_attempt}/{max_rate}..."));
                    log::warn!(
                        "{label}: {} rate limited ({msg}), retry {rate_attempt}/{max_rate} in {last_wait:?}",
                        op.name()
                    );
                    self.stats.retries += 1;
                    self.sleeper.sleep(last_wait);
                }
                Err(CallError::Transient(msg)) => {
                    if transient_attempt >= max_transient {
                        log::warn!("{label}: failed after {max_transient} retries: {msg}");
                        return Err(HarvestError::Transient(msg));
                    }
                    transient_attempt += 1;
                    last_wait = self.next_wait(transient_attempt, last_wait);
                    self.pb.set_message(format!(
                        "retry {transient_attempt}/{max_transient}..."
                    ));
                    log::debug!(
                        "{label}: {} attempt {transient_attempt}/{max_transient} failed: {msg}, retrying in {last_wait:?}",
                        op.name()
                    );
                    self.stats.retries += 1;
                    self.sleeper.sleep(last_wait);
                }
                Err(CallError::Unavailable(msg)) => return Err(HarvestError::Unavailable(msg)),
                Err(CallError::Malformed(msg)) => return Err(HarvestError::MalformedPage(msg)),
            }
        }
    }

    fn next_wait(&self, attempt: u32, floor: Duration) -> Duration {
        let wait = self.policy.jittered(self.policy.backoff_duration(attempt));
        wait.min(self.policy.cap).max(floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSleeper(Arc<Mutex<Vec<Duration>>>);

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    fn policy(jitter: f64) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(100),
            cap: Duration::from_millis(1000),
            rate_limit_attempts: 5,
            transient_attempts: 3,
            jitter,
        }
    }

    fn governor(jitter: f64) -> (Governor, RecordingSleeper) {
        let sleeper = RecordingSleeper::default();
        let gov = Governor::new(policy(jitter)).with_sleeper(sleeper.clone());
        (gov, sleeper)
    }

    #[test]
    fn backoff_exponential_capped() {
        let p = policy(0.0);
        assert_eq!(p.backoff_duration(1), Duration::from_millis(200));
        assert_eq!(p.backoff_duration(2), Duration::from_millis(400));
        assert_eq!(p.backoff_duration(3), Duration::from_millis(800));
        assert_eq!(p.backoff_duration(4), Duration::from_millis(1000));
        assert_eq!(p.backoff_duration(64), Duration::from_millis(1000));
    }

    #[test]
    fn success_records_cost() {
        let (mut gov, sleeper) = governor(0.0);
        let v = gov.call(Operation::Search, "q", || Ok::<_, CallError>(7)).unwrap();
        assert_eq!(v, 7);
        assert_eq!(gov.stats().units_used, 100);
        assert_eq!(gov.stats().calls, 1);
        assert!(sleeper.0.lock().unwrap().is_empty());
    }

    #[test]
    fn rate_limit_then_success() {
        let (mut gov, sleeper) = governor(0.0);
        let calls = Cell::new(0);
        let v = gov
            .call(Operation::ListComments, "v1", || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(CallError::RateLimited("429".into()))
                } else {
                    Ok("page")
                }
            })
            .unwrap();
        assert_eq!(v, "page");
        assert_eq!(gov.stats().rate_limited, 2);
        assert_eq!(gov.stats().retries, 2);
        assert_eq!(gov.stats().units_used, 1);
        assert_eq!(
            *sleeper.0.lock().unwrap(),
            vec![Duration::from_millis(200), Duration::from_millis(400)]
        );
    }

    #[test]
    fn rate_limit_waits_non_decreasing_up_to_cap() {
        let (mut gov, sleeper) = governor(0.5);
        let err = gov
            .call(Operation::ListComments, "v1", || {
                Err::<(), _>(CallError::RateLimited("quotaExceeded".into()))
            })
            .unwrap_err();
        assert!(matches!(err, HarvestError::QuotaExceeded(_)));

        let waits = sleeper.0.lock().unwrap().clone();
        assert_eq!(waits.len(), 5);
        for pair in waits.windows(2) {
            assert!(pair[0] <= pair[1], "waits decreased: {waits:?}");
        }
        assert!(waits.iter().all(|w| *w <= Duration::from_millis(1000)));
    }

    #[test]
    fn quota_exhaustion_latches() {
        let (mut gov, _) = governor(0.0);
        let _ = gov.call(Operation::ListComments, "v1", || {
            Err::<(), _>(CallError::RateLimited("429".into()))
        });
        assert!(gov.is_exhausted());

        let issued = Cell::new(false);
        let err = gov
            .call(Operation::ListComments, "v2", || {
                issued.set(true);
                Ok::<_, CallError>(())
            })
            .unwrap_err();
        assert!(matches!(err, HarvestError::QuotaExceeded(_)));
        assert!(!issued.get());
    }

    #[test]
    fn transient_escalates_after_smaller_cap() {
        let (mut gov, sleeper) = governor(0.0);
        let calls = Cell::new(0);
        let err = gov
            .call(Operation::ListReplies, "c1", || {
                calls.set(calls.get() + 1);
                Err::<(), _>(CallError::Transient("503".into()))
            })
            .unwrap_err();
        assert!(matches!(err, HarvestError::Transient(_)));
        assert_eq!(calls.get(), 4);
        assert_eq!(sleeper.0.lock().unwrap().len(), 3);
        assert!(!gov.is_exhausted());
    }

    #[test]
    fn unavailable_and_malformed_not_retried() {
        let (mut gov, sleeper) = governor(0.0);
        let err = gov
            .call(Operation::ListComments, "v1", || {
                Err::<(), _>(CallError::Unavailable("commentsDisabled".into()))
            })
            .unwrap_err();
        assert!(matches!(err, HarvestError::Unavailable(_)));

        let err = gov
            .call(Operation::ListComments, "v1", || {
                Err::<(), _>(CallError::Malformed("no items".into()))
            })
            .unwrap_err();
        assert!(matches!(err, HarvestError::MalformedPage(_)));
        assert!(sleeper.0.lock().unwrap().is_empty());
        assert_eq!(gov.stats().calls, 2);
    }

    #[test]
    fn budget_blocks_call_before_issue() {
        let (gov, _) = governor(0.0);
        let mut gov = gov.with_budget(Some(150));
        gov.call(Operation::Search, "q1", || Ok::<_, CallError>(()))
            .unwrap();
        assert_eq!(gov.remaining_budget(), Some(50));

        let issued = Cell::new(false);
        let err = gov
            .call(Operation::Search, "q2", || {
                issued.set(true);
                Ok::<_, CallError>(())
            })
            .unwrap_err();
        assert!(matches!(err, HarvestError::QuotaExceeded(_)));
        assert!(!issued.get());
        assert!(gov.is_exhausted());
    }
}
