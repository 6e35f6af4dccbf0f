//! Retry scheduling: bounded attempts, delay policy, optional outer wrap.
//!
//! The scheduler is a three-state machine (Running, Succeeded, Exhausted)
//! driving repeated evaluation of an attempt closure. It sleeps only between
//! attempts, so a set that passes on the first evaluation never sleeps, and
//! N attempts incur exactly N-1 delays. Cancellation is honored at every
//! suspension point.
//!
//! The infinite outer loop some deployments want (keep reconciling forever,
//! e.g. as a long-lived hook) is a separate, explicit [`OuterPolicy`] owned
//! by the driver, never an implicit nested loop here.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Exponential backoff with a cap: `base * multiplier^(attempt-1)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub multiplier: f64,
    pub cap: Duration,
}

impl BackoffPolicy {
    /// Delay to apply after the given 1-based attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let scaled = self.base.as_secs_f64() * self.multiplier.powi(exp as i32);
        Duration::from_secs_f64(scaled.min(self.cap.as_secs_f64()))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            multiplier: 2.0,
            cap: Duration::from_secs(120),
        }
    }
}

/// Delay applied between attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DelayPolicy {
    Fixed(Duration),
    Backoff(BackoffPolicy),
}

impl DelayPolicy {
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            DelayPolicy::Fixed(interval) => *interval,
            DelayPolicy::Backoff(policy) => policy.delay_for(attempt),
        }
    }
}

/// Bounded retry configuration. Per-scheduler, never global: different check
/// sets legitimately run with different budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: DelayPolicy,
}

impl RetryPolicy {
    #[must_use]
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            delay: DelayPolicy::Fixed(interval),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(120, Duration::from_secs(30))
    }
}

/// Explicit opt-in wrapper policy: re-run an exhausted reconciliation
/// indefinitely, pausing between rounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OuterPolicy {
    pub repeat_forever: bool,
    pub pause: Duration,
}

impl Default for OuterPolicy {
    fn default() -> Self {
        Self {
            repeat_forever: false,
            pause: Duration::from_secs(60),
        }
    }
}

/// What one attempt observed, as reported by the attempt closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptVerdict {
    /// Every check passed; the run is done.
    AllPass,
    /// At least one check failed; retry after the delay.
    Failing,
    /// A terminal condition (permission, configuration) was hit; stop now.
    Abort,
}

/// Terminal outcome of a scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerOutcome {
    Succeeded { attempts: u32 },
    Exhausted { attempts: u32 },
    Aborted { attempts: u32 },
    Cancelled { attempts: u32 },
}

pub struct RetryScheduler {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryScheduler {
    #[must_use]
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    /// Drive the attempt closure until success, exhaustion, abort or
    /// cancellation. The closure receives the 1-based attempt number.
    pub async fn run<F, Fut>(&self, mut attempt: F) -> SchedulerOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = AttemptVerdict>,
    {
        let max = self.policy.max_attempts.max(1);
        for n in 1..=max {
            if self.cancel.is_cancelled() {
                return SchedulerOutcome::Cancelled { attempts: n - 1 };
            }
            match attempt(n).await {
                AttemptVerdict::AllPass => return SchedulerOutcome::Succeeded { attempts: n },
                AttemptVerdict::Abort => return SchedulerOutcome::Aborted { attempts: n },
                AttemptVerdict::Failing => {}
            }
            if n == max {
                break;
            }
            let delay = self.policy.delay.delay_for(n);
            debug!(attempt = n, ?delay, "attempt failed, sleeping before retry");
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.cancel.cancelled() => {
                    return SchedulerOutcome::Cancelled { attempts: n };
                }
            }
        }
        SchedulerOutcome::Exhausted { attempts: max }
    }
}
