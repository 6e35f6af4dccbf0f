//! Check framework: named predicates evaluated against cluster state.
//!
//! A check never returns `Err`. Query failures degrade into Fail or
//! Indeterminate results carrying a diagnostic, so one flaky target cannot
//! crash a reconciliation run; only the driver decides process termination.
//!
//! Indeterminate means the check could not be evaluated at all (resource
//! missing, target unreachable). It gates the run exactly like Fail but is
//! logged distinctly so operators can tell "checked and wrong" from "could
//! not check".

pub mod artifact;
pub mod resource;
pub mod spec;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tokio_util::sync::CancellationToken;

use crate::client::SharedClient;
use crate::error::ClientError;
use crate::target::ClusterTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckOutcome {
    Pass,
    Fail,
    Indeterminate,
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::Pass => write!(f, "pass"),
            CheckOutcome::Fail => write!(f, "fail"),
            CheckOutcome::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// Outcome of one check evaluation.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub outcome: CheckOutcome,
    pub diagnostic: String,
    /// Structured data extracted from the queried resource, when useful.
    pub data: Option<Value>,
    /// Set when the failure is terminal (permission/config) and the run
    /// should abort instead of retrying.
    pub terminal: bool,
}

impl CheckResult {
    #[must_use]
    pub fn pass(diagnostic: impl Into<String>) -> Self {
        Self {
            outcome: CheckOutcome::Pass,
            diagnostic: diagnostic.into(),
            data: None,
            terminal: false,
        }
    }

    #[must_use]
    pub fn fail(diagnostic: impl Into<String>) -> Self {
        Self {
            outcome: CheckOutcome::Fail,
            diagnostic: diagnostic.into(),
            data: None,
            terminal: false,
        }
    }

    #[must_use]
    pub fn indeterminate(diagnostic: impl Into<String>) -> Self {
        Self {
            outcome: CheckOutcome::Indeterminate,
            diagnostic: diagnostic.into(),
            data: None,
            terminal: false,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Map a client error into a result: terminal errors abort the run,
    /// everything else is an Indeterminate to be retried.
    #[must_use]
    pub fn from_client_error(err: &ClientError) -> Self {
        if err.is_terminal() {
            Self {
                outcome: CheckOutcome::Fail,
                diagnostic: err.to_string(),
                data: None,
                terminal: true,
            }
        } else {
            Self::indeterminate(err.to_string())
        }
    }

    /// Whether this result blocks an all-pass attempt.
    #[must_use]
    pub fn gates(&self) -> bool {
        self.outcome != CheckOutcome::Pass
    }
}

/// Read-only view of resolved targets, shared by checks and remediations.
/// Carries the run's cancellation token so long-running waits inside
/// remediations stop with the run.
pub struct CheckContext {
    targets: Vec<ClusterTarget>,
    cancel: CancellationToken,
}

impl CheckContext {
    #[must_use]
    pub fn new(targets: Vec<ClusterTarget>) -> Self {
        Self {
            targets,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the context's token with the run-level one.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[must_use]
    pub fn target(&self, name: &str) -> Option<&ClusterTarget> {
        self.targets.iter().find(|t| t.name == name)
    }

    #[must_use]
    pub fn targets(&self) -> &[ClusterTarget] {
        &self.targets
    }

    /// Client for a named target, or the result a check should return when
    /// the target is unknown or its credentials failed to resolve.
    pub fn client_for(&self, name: &str) -> Result<&SharedClient, CheckResult> {
        let Some(target) = self.target(name) else {
            return Err(CheckResult::fail(format!(
                "target '{name}' is not declared in this run"
            )));
        };
        match target.client() {
            Some(client) => Ok(client),
            None => Err(CheckResult::fail(format!(
                "target '{name}' unreachable: {}",
                target
                    .failure()
                    .unwrap_or("credential resolution failed")
            ))),
        }
    }
}

/// A named readiness predicate. Stateless between invocations.
#[async_trait]
pub trait Check: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(&self, ctx: &CheckContext) -> CheckResult;
}

/// The registry: an ordered set of checks evaluated as a logical AND.
#[derive(Default)]
pub struct CheckSet {
    checks: Vec<Box<dyn Check>>,
}

impl CheckSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, check: Box<dyn Check>) {
        self.checks.push(check);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Evaluate every registered check once, in order. Once cancellation is
    /// requested the remaining checks are skipped and recorded as
    /// Indeterminate instead of issuing further remote calls.
    pub async fn evaluate_all(&self, ctx: &CheckContext) -> Vec<(String, CheckResult)> {
        let mut results = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let result = if ctx.is_cancelled() {
                CheckResult::indeterminate("evaluation cancelled")
            } else {
                check.evaluate(ctx).await
            };
            results.push((check.name().to_string(), result));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticCheck {
        name: &'static str,
        outcome: CheckOutcome,
    }

    #[async_trait]
    impl Check for StaticCheck {
        fn name(&self) -> &str {
            self.name
        }

        async fn evaluate(&self, _ctx: &CheckContext) -> CheckResult {
            match self.outcome {
                CheckOutcome::Pass => CheckResult::pass("ok"),
                CheckOutcome::Fail => CheckResult::fail("broken"),
                CheckOutcome::Indeterminate => CheckResult::indeterminate("unknown"),
            }
        }
    }

    #[tokio::test]
    async fn evaluate_all_preserves_registration_order() {
        let mut set = CheckSet::new();
        set.register(Box::new(StaticCheck {
            name: "odf-ready",
            outcome: CheckOutcome::Pass,
        }));
        set.register(Box::new(StaticCheck {
            name: "submariner-connected",
            outcome: CheckOutcome::Fail,
        }));
        let ctx = CheckContext::new(vec![]);
        let results = set.evaluate_all(&ctx).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "odf-ready");
        assert!(!results[0].1.gates());
        assert_eq!(results[1].0, "submariner-connected");
        assert!(results[1].1.gates());
    }

    #[test]
    fn indeterminate_gates_like_fail() {
        assert!(CheckResult::indeterminate("resource missing").gates());
        assert!(CheckResult::fail("wrong phase").gates());
        assert!(!CheckResult::pass("ok").gates());
    }

    #[test]
    fn client_error_mapping_marks_terminal_failures() {
        let denied = ClientError::PermissionDenied("secrets is forbidden".into());
        let result = CheckResult::from_client_error(&denied);
        assert_eq!(result.outcome, CheckOutcome::Fail);
        assert!(result.terminal);

        let transient = ClientError::Transient("connection refused".into());
        let result = CheckResult::from_client_error(&transient);
        assert_eq!(result.outcome, CheckOutcome::Indeterminate);
        assert!(!result.terminal);
    }

    #[tokio::test]
    async fn cancelled_context_skips_evaluation() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        struct CountingCheck {
            evaluations: Arc<AtomicU32>,
        }

        #[async_trait]
        impl Check for CountingCheck {
            fn name(&self) -> &str {
                "counting"
            }

            async fn evaluate(&self, _ctx: &CheckContext) -> CheckResult {
                self.evaluations.fetch_add(1, Ordering::SeqCst);
                CheckResult::pass("ok")
            }
        }

        let evaluations = Arc::new(AtomicU32::new(0));
        let mut set = CheckSet::new();
        set.register(Box::new(CountingCheck {
            evaluations: evaluations.clone(),
        }));

        let token = CancellationToken::new();
        token.cancel();
        let ctx = CheckContext::new(vec![]).with_cancel(token);
        let results = set.evaluate_all(&ctx).await;

        assert_eq!(evaluations.load(Ordering::SeqCst), 0);
        assert_eq!(results[0].1.outcome, CheckOutcome::Indeterminate);
        assert!(results[0].1.diagnostic.contains("cancelled"));
    }

    #[tokio::test]
    async fn unresolved_target_produces_credential_diagnostic() {
        let ctx = CheckContext::new(vec![crate::target::ClusterTarget::unresolved(
            "dr1",
            "credential resolution failed for target 'dr1': secret missing",
        )]);
        let err = ctx.client_for("dr1").err().unwrap();
        assert!(err.gates());
        assert!(err.diagnostic.contains("credential resolution failed"));
        assert!(err.diagnostic.contains("dr1"));
    }
}
