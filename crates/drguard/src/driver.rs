//! Reconciliation driver: the top-level loop.
//!
//! Composes the check set, retry scheduler and remediation executor into one
//! run: evaluate all checks, remediate failures when enabled, sleep, retry;
//! finish with a summary enumerating exactly which checks are still failing.
//! Only this layer decides process-level termination.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::checks::{CheckContext, CheckOutcome, CheckResult, CheckSet};
use crate::config::ReconcilerConfig;
use crate::remediation::RemediationExecutor;
use crate::scheduler::{AttemptVerdict, RetryScheduler, SchedulerOutcome};

/// Terminal verdict of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunVerdict {
    /// Every check passed in one attempt.
    Succeeded,
    /// Attempt budget spent with checks still failing.
    Exhausted,
    /// A terminal error (permission, configuration) stopped the run early.
    Aborted,
    /// Cancellation was requested.
    Cancelled,
}

/// One check's outcome in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRecord {
    pub name: String,
    pub outcome: CheckOutcome,
    pub diagnostic: String,
}

impl CheckRecord {
    fn from_result(name: &str, result: &CheckResult) -> Self {
        Self {
            name: name.to_string(),
            outcome: result.outcome,
            diagnostic: result.diagnostic.clone(),
        }
    }
}

/// Report of one reconciliation run, serializable for downstream automation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunReport {
    pub verdict: RunVerdict,
    pub attempts: u32,
    /// Names of checks still failing at the end of the run.
    pub failing: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Per-check results from the final attempt.
    pub last_attempt: Vec<CheckRecord>,
}

impl RunReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.verdict == RunVerdict::Succeeded
    }
}

pub struct ReconciliationDriver {
    config: ReconcilerConfig,
    checks: CheckSet,
    executor: RemediationExecutor,
    ctx: CheckContext,
    cancel: CancellationToken,
}

impl ReconciliationDriver {
    #[must_use]
    pub fn new(
        config: ReconcilerConfig,
        checks: CheckSet,
        executor: RemediationExecutor,
        ctx: CheckContext,
        cancel: CancellationToken,
    ) -> Self {
        // Checks and remediations observe the same token as the driver, so
        // a cancelled run stops mid-evaluation and mid-settle too.
        Self {
            config,
            checks,
            executor,
            ctx: ctx.with_cancel(cancel.clone()),
            cancel,
        }
    }

    /// Run to completion, honoring the outer-wrap policy: an exhausted run
    /// is re-run indefinitely only when explicitly configured to.
    pub async fn run(&self) -> RunReport {
        loop {
            let report = self.run_once().await;
            let wrap = self.config.outer.repeat_forever
                && report.verdict == RunVerdict::Exhausted
                && !self.cancel.is_cancelled();
            if !wrap {
                return report;
            }
            warn!(
                pause = ?self.config.outer.pause,
                "attempts exhausted, outer policy requests another round"
            );
            tokio::select! {
                () = tokio::time::sleep(self.config.outer.pause) => {}
                () = self.cancel.cancelled() => return report,
            }
        }
    }

    /// One bounded reconciliation: at most `retry.max_attempts` evaluations.
    pub async fn run_once(&self) -> RunReport {
        let started_at = Utc::now();
        let last_attempt = tokio::sync::Mutex::new(Vec::<(String, CheckResult)>::new());

        let scheduler = RetryScheduler::new(self.config.retry.clone(), self.cancel.clone());
        let outcome = scheduler
            .run(|attempt| {
                let last_attempt = &last_attempt;
                async move {
                    let verdict = self.evaluate_attempt(attempt).await;
                    *last_attempt.lock().await = verdict.1;
                    verdict.0
                }
            })
            .await;

        let results = last_attempt.into_inner();
        let failing: Vec<String> = results
            .iter()
            .filter(|(_, r)| r.gates())
            .map(|(name, _)| name.clone())
            .collect();
        let last_attempt: Vec<CheckRecord> = results
            .iter()
            .map(|(name, r)| CheckRecord::from_result(name, r))
            .collect();

        let (verdict, attempts) = match outcome {
            SchedulerOutcome::Succeeded { attempts } => (RunVerdict::Succeeded, attempts),
            SchedulerOutcome::Exhausted { attempts } => (RunVerdict::Exhausted, attempts),
            SchedulerOutcome::Aborted { attempts } => (RunVerdict::Aborted, attempts),
            SchedulerOutcome::Cancelled { attempts } => (RunVerdict::Cancelled, attempts),
        };

        let report = RunReport {
            verdict,
            attempts,
            failing,
            started_at,
            finished_at: Utc::now(),
            last_attempt,
        };
        self.summarize(&report);
        report
    }

    /// Evaluate every check once; remediate failures when enabled.
    async fn evaluate_attempt(&self, attempt: u32) -> (AttemptVerdict, Vec<(String, CheckResult)>) {
        info!(attempt, checks = self.checks.len(), "evaluating check set");
        let results = self.checks.evaluate_all(&self.ctx).await;

        let mut failing = Vec::new();
        let mut terminal = false;
        for (name, result) in &results {
            match result.outcome {
                CheckOutcome::Pass => info!(check = %name, "pass: {}", result.diagnostic),
                CheckOutcome::Fail => warn!(check = %name, "fail: {}", result.diagnostic),
                CheckOutcome::Indeterminate => {
                    warn!(check = %name, "indeterminate: {}", result.diagnostic);
                }
            }
            if result.gates() {
                failing.push(name.clone());
            }
            terminal = terminal || result.terminal;
        }

        let verdict = if failing.is_empty() {
            AttemptVerdict::AllPass
        } else if terminal {
            error!("terminal error encountered, aborting instead of retrying");
            AttemptVerdict::Abort
        } else {
            if self.config.remediate && !self.executor.is_empty() && !self.cancel.is_cancelled() {
                self.executor.run_for_failures(&failing, &self.ctx).await;
            }
            AttemptVerdict::Failing
        };
        (verdict, results)
    }

    fn summarize(&self, report: &RunReport) {
        match report.verdict {
            RunVerdict::Succeeded => {
                info!(
                    attempts = report.attempts,
                    "all checks passed, cluster set is ready"
                );
            }
            RunVerdict::Exhausted => {
                error!(
                    attempts = report.attempts,
                    "attempts exhausted with {} check(s) still failing: {}",
                    report.failing.len(),
                    report.failing.join(", ")
                );
                for record in &report.last_attempt {
                    if record.outcome != CheckOutcome::Pass {
                        error!(check = %record.name, "{}: {}", record.outcome, record.diagnostic);
                    }
                }
            }
            RunVerdict::Aborted => {
                error!(
                    attempts = report.attempts,
                    "run aborted on terminal error; failing: {}",
                    report.failing.join(", ")
                );
            }
            RunVerdict::Cancelled => {
                warn!(attempts = report.attempts, "run cancelled");
            }
        }
    }
}
