//! Uniform access to remote resource state.
//!
//! The [`ApiClient`] trait is the single seam between the reconciliation
//! engine and the backing control plane. Checks and remediations only ever
//! see this trait, so the engine can run against a live cluster
//! ([`k8s::KubeApiClient`]) or an in-memory fake in tests.
//!
//! NotFound is a first-class result, not an error: a missing resource is a
//! normal observation for a readiness check. Deletes are idempotent and
//! creates tolerate AlreadyExists by replacing, so remediations stay safely
//! retryable even when a previous attempt was partially applied.

pub mod k8s;
pub mod projection;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Coordinates of one resource: apiVersion/kind plus namespace/name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResourceKey {
    /// Kubernetes apiVersion, e.g. `v1` or `ramendr.openshift.io/v1alpha1`.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub namespace: Option<String>,
    pub name: String,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl ResourceKey {
    #[must_use]
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.map(String::from),
            name: name.into(),
        }
    }

    /// Core v1 namespaced resource shorthand.
    #[must_use]
    pub fn core(kind: impl Into<String>, namespace: &str, name: impl Into<String>) -> Self {
        Self::new("v1", kind, Some(namespace), name)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} {}/{}", self.api_version, self.kind, ns, self.name),
            None => write!(f, "{}/{} {}", self.api_version, self.kind, self.name),
        }
    }
}

/// Outcome of a `get`: a missing resource is an observation, not an error.
#[derive(Debug, Clone)]
pub enum GetOutcome {
    Found(Value),
    NotFound,
}

/// Patch strategies supported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchStrategy {
    /// Strategic/JSON merge patch.
    Merge,
    /// RFC 6902 JSON patch: the document is an array of operations.
    Json,
    /// Server-side apply with this reconciler as field manager.
    Apply,
}

/// Condition a bounded `wait` polls for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WaitCondition {
    /// A dot-path field on the resource equals the expected value.
    FieldEquals { path: String, expected: Value },
    /// The resource no longer exists.
    Gone,
}

/// Result of a bounded wait. Timing out is a value, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Satisfied,
    TimedOut,
    /// Cancellation was requested while waiting.
    Cancelled,
}

/// Interval between polls inside a bounded wait.
const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Uniform read/write access to a remote control plane.
///
/// All operations are remote and may be partially applied; callers must not
/// assume atomicity across calls.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn get(&self, key: &ResourceKey) -> Result<GetOutcome>;

    async fn list(
        &self,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> Result<Vec<Value>>;

    async fn patch(&self, key: &ResourceKey, patch: &Value, strategy: PatchStrategy)
        -> Result<Value>;

    /// Create the resource; if it already exists, replace it.
    async fn create(&self, key: &ResourceKey, spec: &Value) -> Result<Value>;

    /// Delete the resource. Deleting a resource that does not exist succeeds.
    async fn delete(&self, key: &ResourceKey) -> Result<()>;

    /// Poll until `condition` holds, `timeout` elapses or cancellation is
    /// requested.
    ///
    /// Default implementation polls `get` at a fixed interval; remediations
    /// that need to wait for a restart or teardown go through this single
    /// primitive so timeout semantics stay uniform. The token is consulted
    /// before every poll and during every sleep, so a long settle cannot
    /// outlive an interrupted run.
    async fn wait(
        &self,
        key: &ResourceKey,
        condition: &WaitCondition,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if cancel.is_cancelled() {
                return Ok(WaitOutcome::Cancelled);
            }
            let outcome = self.get(key).await?;
            let satisfied = match (&outcome, condition) {
                (GetOutcome::NotFound, WaitCondition::Gone) => true,
                (GetOutcome::Found(obj), WaitCondition::FieldEquals { path, expected }) => {
                    projection::project(obj, path) == Some(expected)
                }
                _ => false,
            };
            if satisfied {
                return Ok(WaitOutcome::Satisfied);
            }
            if tokio::time::Instant::now() + WAIT_POLL_INTERVAL > deadline {
                return Ok(WaitOutcome::TimedOut);
            }
            tokio::select! {
                () = tokio::time::sleep(WAIT_POLL_INTERVAL) => {}
                () = cancel.cancelled() => return Ok(WaitOutcome::Cancelled),
            }
        }
    }
}

/// Shared handle passed into checks and remediations.
pub type SharedClient = Arc<dyn ApiClient>;

#[cfg(test)]
pub(crate) mod testing {
    use super::{ApiClient, GetOutcome, PatchStrategy, ResourceKey};
    use crate::error::{ClientError, Result};
    use async_trait::async_trait;
    use serde_json::Value;

    /// Client whose every call fails transiently, for tests that must not
    /// reach a real API.
    pub struct NullClient;

    #[async_trait]
    impl ApiClient for NullClient {
        async fn get(&self, _key: &ResourceKey) -> Result<GetOutcome> {
            Err(ClientError::Transient("null client".into()))
        }

        async fn list(
            &self,
            _api_version: &str,
            _kind: &str,
            _namespace: Option<&str>,
            _label_selector: Option<&str>,
        ) -> Result<Vec<Value>> {
            Err(ClientError::Transient("null client".into()))
        }

        async fn patch(
            &self,
            _key: &ResourceKey,
            _patch: &Value,
            _strategy: PatchStrategy,
        ) -> Result<Value> {
            Err(ClientError::Transient("null client".into()))
        }

        async fn create(&self, _key: &ResourceKey, _spec: &Value) -> Result<Value> {
            Err(ClientError::Transient("null client".into()))
        }

        async fn delete(&self, _key: &ResourceKey) -> Result<()> {
            Err(ClientError::Transient("null client".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_key_display_includes_namespace_when_present() {
        let key = ResourceKey::core("ConfigMap", "openshift-config", "trusted-ca");
        assert_eq!(key.to_string(), "v1/ConfigMap openshift-config/trusted-ca");

        let cluster_scoped = ResourceKey::new(
            "cluster.open-cluster-management.io/v1",
            "ManagedCluster",
            None,
            "dr1",
        );
        assert_eq!(
            cluster_scoped.to_string(),
            "cluster.open-cluster-management.io/v1/ManagedCluster dr1"
        );
    }

    #[test]
    fn resource_key_deserializes_with_default_api_version() {
        let key: ResourceKey =
            serde_yaml::from_str("kind: Secret\nnamespace: dr-hub\nname: dr1-kubeconfig").unwrap();
        assert_eq!(key.api_version, "v1");
        assert_eq!(key.namespace.as_deref(), Some("dr-hub"));
    }

    /// Never satisfies a field condition; for exercising the wait loop.
    struct IdleClient;

    #[async_trait]
    impl ApiClient for IdleClient {
        async fn get(&self, _key: &ResourceKey) -> Result<GetOutcome> {
            Ok(GetOutcome::Found(serde_json::json!({"status": {}})))
        }

        async fn list(
            &self,
            _api_version: &str,
            _kind: &str,
            _namespace: Option<&str>,
            _label_selector: Option<&str>,
        ) -> Result<Vec<Value>> {
            Ok(vec![])
        }

        async fn patch(
            &self,
            _key: &ResourceKey,
            _patch: &Value,
            _strategy: PatchStrategy,
        ) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn create(&self, _key: &ResourceKey, _spec: &Value) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn delete(&self, _key: &ResourceKey) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn pre_cancelled_wait_issues_no_remote_call() {
        // NullClient errors on any call; a pre-cancelled token must win
        // before the first poll.
        let cancel = CancellationToken::new();
        cancel.cancel();
        let key = ResourceKey::core("Pod", "submariner-operator", "gw-1");
        let outcome = testing::NullClient
            .wait(&key, &WaitCondition::Gone, Duration::from_secs(600), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_honors_cancellation_mid_poll() {
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });
        let key = ResourceKey::core("Pod", "submariner-operator", "gw-1");
        let start = tokio::time::Instant::now();
        let outcome = IdleClient
            .wait(
                &key,
                &WaitCondition::FieldEquals {
                    path: "status.phase".into(),
                    expected: serde_json::json!("Running"),
                },
                Duration::from_secs(600),
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(600));
    }
}
