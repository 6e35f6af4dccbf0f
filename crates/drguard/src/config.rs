//! Reconciler configuration.
//!
//! Every tunable the polling loops depend on lives here explicitly: attempt
//! budgets, intervals, the outer-wrap policy, credential naming. Nothing is
//! ambient; the CLI fills this struct from flags and environment variables
//! and validates it before a run starts.

use std::time::Duration;

use crate::error::{ClientError, Result};
use crate::scheduler::{BackoffPolicy, DelayPolicy, OuterPolicy, RetryPolicy};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Hub namespace holding per-cluster kubeconfig secrets.
    pub hub_namespace: String,
    /// Secret naming convention: `<cluster>-<suffix>`.
    pub secret_suffix: String,
    /// Key inside the secret holding the kubeconfig.
    pub secret_key: String,
    /// Attempt budget and interval for the check loop.
    pub retry: RetryPolicy,
    /// Separate policy for credential acquisition, with backoff.
    pub resolve_retry: RetryPolicy,
    /// Optional infinite outer wrap around an exhausted run.
    pub outer: OuterPolicy,
    /// Whether failing checks trigger their remediations.
    pub remediate: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            hub_namespace: "open-cluster-management".to_string(),
            secret_suffix: "admin-kubeconfig".to_string(),
            secret_key: "kubeconfig".to_string(),
            retry: RetryPolicy::default(),
            resolve_retry: RetryPolicy {
                max_attempts: 5,
                delay: DelayPolicy::Backoff(BackoffPolicy::default()),
            },
            outer: OuterPolicy::default(),
            remediate: true,
        }
    }
}

impl ReconcilerConfig {
    /// Single-pass configuration for check-only/gating mode: one attempt,
    /// no remediation, no outer wrap.
    #[must_use]
    pub fn check_only(mut self) -> Self {
        self.retry = RetryPolicy::fixed(1, Duration::ZERO);
        self.remediate = false;
        self.outer.repeat_forever = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(ClientError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.resolve_retry.max_attempts == 0 {
            return Err(ClientError::Config(
                "resolve_retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.hub_namespace.is_empty() {
            return Err(ClientError::Config(
                "hub_namespace must not be empty".to_string(),
            ));
        }
        if self.secret_suffix.is_empty() || self.secret_key.is_empty() {
            return Err(ClientError::Config(
                "secret_suffix and secret_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = ReconcilerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_attempts, 120);
        assert!(config.remediate);
        assert!(!config.outer.repeat_forever);
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let mut config = ReconcilerConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn check_only_mode_disables_retries_and_remediation() {
        let config = ReconcilerConfig::default().check_only();
        assert_eq!(config.retry.max_attempts, 1);
        assert!(!config.remediate);
        assert!(!config.outer.repeat_forever);
    }
}
