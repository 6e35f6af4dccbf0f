//! Cluster targets and credential resolution.
//!
//! Each managed cluster is reached through credentials stored on the hub: a
//! secret holding a kubeconfig, named either explicitly in the target spec or
//! by the `<cluster>-<suffix>` convention. Resolution is itself fallible and
//! carries its own retry policy; a target that cannot be resolved is kept in
//! the run as Unreachable so every check depending on it fails with a
//! credential-resolution diagnostic rather than a generic one.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::{projection, GetOutcome, ResourceKey, SharedClient};
use crate::error::{ClientError, Result};
use crate::scheduler::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reachability {
    Unknown,
    Reachable,
    Unreachable,
}

/// A managed cluster the reconciler talks to.
#[derive(Clone)]
pub struct ClusterTarget {
    pub name: String,
    pub reachability: Reachability,
    client: Option<SharedClient>,
    failure: Option<String>,
}

impl ClusterTarget {
    #[must_use]
    pub fn resolved(name: impl Into<String>, client: SharedClient) -> Self {
        Self {
            name: name.into(),
            reachability: Reachability::Reachable,
            client: Some(client),
            failure: None,
        }
    }

    #[must_use]
    pub fn unresolved(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reachability: Reachability::Unreachable,
            client: None,
            failure: Some(reason.into()),
        }
    }

    #[must_use]
    pub fn client(&self) -> Option<&SharedClient> {
        self.client.as_ref()
    }

    /// Why the target is unreachable, when it is.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }
}

/// Declarative target entry from the check-definition file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetSpec {
    pub name: String,
    /// Use the hub's own client instead of resolving a kubeconfig secret.
    #[serde(default)]
    pub local: bool,
    /// Explicit kubeconfig secret name, overriding the naming convention.
    #[serde(default)]
    pub kubeconfig_secret: Option<String>,
}

/// Builds a per-target client from kubeconfig bytes. Seam for tests.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn from_kubeconfig(&self, bytes: &[u8]) -> Result<SharedClient>;
}

/// Production factory backed by [`crate::client::k8s::KubeApiClient`].
pub struct KubeClientFactory;

#[async_trait]
impl ClientFactory for KubeClientFactory {
    async fn from_kubeconfig(&self, bytes: &[u8]) -> Result<SharedClient> {
        let client = crate::client::k8s::KubeApiClient::from_kubeconfig_bytes(bytes).await?;
        Ok(std::sync::Arc::new(client))
    }
}

/// Resolves [`TargetSpec`]s into [`ClusterTarget`]s via hub secrets.
pub struct TargetResolver {
    hub: SharedClient,
    factory: Box<dyn ClientFactory>,
    hub_namespace: String,
    secret_suffix: String,
    secret_key: String,
    retry: RetryPolicy,
}

impl TargetResolver {
    #[must_use]
    pub fn new(
        hub: SharedClient,
        factory: Box<dyn ClientFactory>,
        hub_namespace: impl Into<String>,
        secret_suffix: impl Into<String>,
        secret_key: impl Into<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            hub,
            factory,
            hub_namespace: hub_namespace.into(),
            secret_suffix: secret_suffix.into(),
            secret_key: secret_key.into(),
            retry,
        }
    }

    /// Ordered secret-name candidates, first success wins.
    fn candidate_secret_names(&self, spec: &TargetSpec) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(explicit) = &spec.kubeconfig_secret {
            names.push(explicit.clone());
        }
        names.push(format!("{}-{}", spec.name, self.secret_suffix));
        names
    }

    /// Resolve every target. Targets are resolved once per run; a failure
    /// yields an Unreachable target rather than an error.
    pub async fn resolve_all(
        &self,
        specs: &[TargetSpec],
        cancel: &CancellationToken,
    ) -> Vec<ClusterTarget> {
        let mut targets = Vec::with_capacity(specs.len());
        for spec in specs {
            if cancel.is_cancelled() {
                targets.push(ClusterTarget::unresolved(
                    &spec.name,
                    "credential resolution cancelled",
                ));
                continue;
            }
            targets.push(self.resolve(spec, cancel).await);
        }
        targets
    }

    async fn resolve(&self, spec: &TargetSpec, cancel: &CancellationToken) -> ClusterTarget {
        if spec.local {
            info!(target = %spec.name, "using hub client for local target");
            return ClusterTarget::resolved(&spec.name, self.hub.clone());
        }

        let candidates = self.candidate_secret_names(spec);
        let max = self.retry.max_attempts.max(1);
        let mut last_reason = String::new();

        for attempt in 1..=max {
            match self.try_resolve(spec, &candidates).await {
                Ok(client) => {
                    info!(target = %spec.name, attempt, "resolved cluster credentials");
                    return ClusterTarget::resolved(&spec.name, client);
                }
                Err(err) => {
                    last_reason = err.to_string();
                    if err.is_terminal() {
                        break;
                    }
                    warn!(
                        target = %spec.name,
                        attempt,
                        "credential resolution failed: {last_reason}"
                    );
                }
            }
            if attempt == max {
                break;
            }
            let delay = self.retry.delay.delay_for(attempt);
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => break,
            }
        }

        let error = ClientError::CredentialResolution {
            target: spec.name.clone(),
            reason: last_reason,
        };
        warn!(target = %spec.name, "marking target unreachable: {error}");
        ClusterTarget::unresolved(&spec.name, error.to_string())
    }

    async fn try_resolve(&self, spec: &TargetSpec, candidates: &[String]) -> Result<SharedClient> {
        for secret_name in candidates {
            let key = ResourceKey::core("Secret", &self.hub_namespace, secret_name.clone());
            match self.hub.get(&key).await? {
                GetOutcome::NotFound => continue,
                GetOutcome::Found(secret) => {
                    let encoded = projection::project_str(&secret, &format!("data.{}", self.secret_key))
                        .ok_or_else(|| {
                            ClientError::Config(format!(
                                "secret {key} has no '{}' key",
                                self.secret_key
                            ))
                        })?;
                    let bytes = general_purpose::STANDARD.decode(encoded).map_err(|e| {
                        ClientError::Config(format!("secret {key} is not valid base64: {e}"))
                    })?;
                    return self.factory.from_kubeconfig(&bytes).await;
                }
            }
        }
        Err(ClientError::Transient(format!(
            "no kubeconfig secret found in namespace '{}' (tried: {})",
            self.hub_namespace,
            candidates.join(", ")
        )))
    }
}
