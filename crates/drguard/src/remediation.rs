//! Remediation: corrective actions applied between retry attempts.
//!
//! Remediations are invoked only by the driver, never from inside a check,
//! so a check-only mode stays possible. Every action is idempotent: applying
//! it twice against the same failing precondition must leave the same end
//! state. A failed remediation is logged and the run re-checks on the next
//! attempt; the precondition may have changed through external means.
//!
//! Actions that need to wait for the system to settle (pod restart, resource
//! teardown) go through [`ApiClient::wait`], keeping timeout semantics
//! uniform with everything else instead of ad hoc sleep loops.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checks::CheckContext;
use crate::client::{
    projection, ApiClient, GetOutcome, PatchStrategy, ResourceKey, WaitCondition, WaitOutcome,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationResult {
    /// The corrective action was performed.
    Applied,
    /// The precondition did not call for action (already converged).
    NotApplicable,
    /// The action could not be performed; non-fatal, logged.
    Failed(String),
}

/// A corrective action tied to a failing check by name.
#[async_trait]
pub trait Remediation: Send + Sync {
    fn name(&self) -> &str;

    /// Name of the check whose failure triggers this action.
    fn check_name(&self) -> &str;

    async fn apply(&self, ctx: &CheckContext) -> RemediationResult;
}

/// Bounded wait performed after an action, through the client's primitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WaitFor {
    pub condition: WaitCondition,
    pub timeout_secs: u64,
}

async fn settle(
    client: &dyn ApiClient,
    key: &ResourceKey,
    wait: Option<&WaitFor>,
    cancel: &CancellationToken,
) -> RemediationResult {
    let Some(wait) = wait else {
        return RemediationResult::Applied;
    };
    match client
        .wait(
            key,
            &wait.condition,
            Duration::from_secs(wait.timeout_secs),
            cancel,
        )
        .await
    {
        Ok(WaitOutcome::Satisfied) => RemediationResult::Applied,
        Ok(WaitOutcome::TimedOut) => RemediationResult::Failed(format!(
            "{key} did not settle within {}s",
            wait.timeout_secs
        )),
        Ok(WaitOutcome::Cancelled) => {
            RemediationResult::Failed(format!("wait for {key} cancelled"))
        }
        Err(err) => RemediationResult::Failed(err.to_string()),
    }
}

/// Delete a resource (restart-by-delete for pods, clearing a stuck object).
/// Deleting an already-absent resource is a no-op success.
pub struct DeleteResource {
    pub name: String,
    pub check_name: String,
    pub target: String,
    pub resource: ResourceKey,
    /// Wait for the resource to be gone before the next attempt.
    pub wait_gone_secs: Option<u64>,
}

#[async_trait]
impl Remediation for DeleteResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_name(&self) -> &str {
        &self.check_name
    }

    async fn apply(&self, ctx: &CheckContext) -> RemediationResult {
        let client = match ctx.client_for(&self.target) {
            Ok(client) => client,
            Err(result) => return RemediationResult::Failed(result.diagnostic),
        };
        if let Err(err) = client.delete(&self.resource).await {
            return RemediationResult::Failed(err.to_string());
        }
        let wait = self.wait_gone_secs.map(|timeout_secs| WaitFor {
            condition: WaitCondition::Gone,
            timeout_secs,
        });
        settle(client.as_ref(), &self.resource, wait.as_ref(), ctx.cancel()).await
    }
}

/// Apply a patch document to a resource (ConfigMap key fix, disabling a
/// GitOps application's automated sync policy).
pub struct PatchResource {
    pub name: String,
    pub check_name: String,
    pub target: String,
    pub resource: ResourceKey,
    pub patch: Value,
    pub strategy: PatchStrategy,
    pub wait: Option<WaitFor>,
}

#[async_trait]
impl Remediation for PatchResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_name(&self) -> &str {
        &self.check_name
    }

    async fn apply(&self, ctx: &CheckContext) -> RemediationResult {
        let client = match ctx.client_for(&self.target) {
            Ok(client) => client,
            Err(result) => return RemediationResult::Failed(result.diagnostic),
        };
        if let Err(err) = client.patch(&self.resource, &self.patch, self.strategy).await {
            return RemediationResult::Failed(err.to_string());
        }
        settle(client.as_ref(), &self.resource, self.wait.as_ref(), ctx.cancel()).await
    }
}

/// Merge labels into a resource, the tagging analog: re-applying the same
/// labels is detected up front and reported as NotApplicable.
pub struct EnsureLabels {
    pub name: String,
    pub check_name: String,
    pub target: String,
    pub resource: ResourceKey,
    pub labels: BTreeMap<String, String>,
}

#[async_trait]
impl Remediation for EnsureLabels {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_name(&self) -> &str {
        &self.check_name
    }

    async fn apply(&self, ctx: &CheckContext) -> RemediationResult {
        let client = match ctx.client_for(&self.target) {
            Ok(client) => client,
            Err(result) => return RemediationResult::Failed(result.diagnostic),
        };
        let current = match client.get(&self.resource).await {
            Ok(GetOutcome::Found(obj)) => obj,
            Ok(GetOutcome::NotFound) => {
                return RemediationResult::Failed(format!("{} not found", self.resource));
            }
            Err(err) => return RemediationResult::Failed(err.to_string()),
        };
        // Label keys carry dots and slashes, so look them up literally
        // instead of dot-projecting.
        let current_labels = projection::project(&current, "metadata.labels")
            .and_then(Value::as_object);
        let already_present = self.labels.iter().all(|(k, v)| {
            current_labels
                .and_then(|labels| labels.get(k))
                .and_then(Value::as_str)
                == Some(v)
        });
        if already_present {
            return RemediationResult::NotApplicable;
        }
        let patch = json!({"metadata": {"labels": self.labels}});
        match client
            .patch(&self.resource, &patch, PatchStrategy::Merge)
            .await
        {
            Ok(_) => RemediationResult::Applied,
            Err(err) => RemediationResult::Failed(err.to_string()),
        }
    }
}

/// Create a resource from a manifest, replacing it if it already exists
/// (re-running a distribution job, reinstating a deleted ConfigMap).
pub struct ApplyManifest {
    pub name: String,
    pub check_name: String,
    pub target: String,
    pub resource: ResourceKey,
    pub manifest: Value,
    pub wait: Option<WaitFor>,
}

#[async_trait]
impl Remediation for ApplyManifest {
    fn name(&self) -> &str {
        &self.name
    }

    fn check_name(&self) -> &str {
        &self.check_name
    }

    async fn apply(&self, ctx: &CheckContext) -> RemediationResult {
        let client = match ctx.client_for(&self.target) {
            Ok(client) => client,
            Err(result) => return RemediationResult::Failed(result.diagnostic),
        };
        if let Err(err) = client.create(&self.resource, &self.manifest).await {
            return RemediationResult::Failed(err.to_string());
        }
        settle(client.as_ref(), &self.resource, self.wait.as_ref(), ctx.cancel()).await
    }
}

/// Declarative remediation entry attached to a check definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum RemediationSpec {
    DeleteResource {
        target: String,
        resource: ResourceKey,
        #[serde(default)]
        wait_gone_secs: Option<u64>,
    },
    PatchResource {
        target: String,
        resource: ResourceKey,
        patch: Value,
        #[serde(default = "default_strategy")]
        strategy: PatchStrategy,
        #[serde(default)]
        wait: Option<WaitFor>,
    },
    EnsureLabels {
        target: String,
        resource: ResourceKey,
        labels: BTreeMap<String, String>,
    },
    ApplyManifest {
        target: String,
        resource: ResourceKey,
        manifest: Value,
        #[serde(default)]
        wait: Option<WaitFor>,
    },
}

fn default_strategy() -> PatchStrategy {
    PatchStrategy::Merge
}

impl RemediationSpec {
    /// Build the runtime action servicing the named check.
    #[must_use]
    pub fn build(self, check_name: &str) -> Box<dyn Remediation> {
        let name = format!("{check_name}-remediation");
        match self {
            RemediationSpec::DeleteResource {
                target,
                resource,
                wait_gone_secs,
            } => Box::new(DeleteResource {
                name,
                check_name: check_name.to_string(),
                target,
                resource,
                wait_gone_secs,
            }),
            RemediationSpec::PatchResource {
                target,
                resource,
                patch,
                strategy,
                wait,
            } => Box::new(PatchResource {
                name,
                check_name: check_name.to_string(),
                target,
                resource,
                patch,
                strategy,
                wait,
            }),
            RemediationSpec::EnsureLabels {
                target,
                resource,
                labels,
            } => Box::new(EnsureLabels {
                name,
                check_name: check_name.to_string(),
                target,
                resource,
                labels,
            }),
            RemediationSpec::ApplyManifest {
                target,
                resource,
                manifest,
                wait,
            } => Box::new(ApplyManifest {
                name,
                check_name: check_name.to_string(),
                target,
                resource,
                manifest,
                wait,
            }),
        }
    }
}

/// Runs the remediations that service the checks failing this attempt.
#[derive(Default)]
pub struct RemediationExecutor {
    remediations: Vec<Box<dyn Remediation>>,
}

impl RemediationExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, remediation: Box<dyn Remediation>) {
        self.remediations.push(remediation);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remediations.is_empty()
    }

    /// Apply every remediation whose check is in the failing set, in
    /// registration order. Failures are logged, never propagated.
    pub async fn run_for_failures(
        &self,
        failing: &[String],
        ctx: &CheckContext,
    ) -> Vec<(String, RemediationResult)> {
        let mut outcomes = Vec::new();
        for remediation in &self.remediations {
            if !failing.iter().any(|name| name == remediation.check_name()) {
                continue;
            }
            let result = remediation.apply(ctx).await;
            match &result {
                RemediationResult::Applied => {
                    info!(
                        remediation = remediation.name(),
                        check = remediation.check_name(),
                        "remediation applied"
                    );
                }
                RemediationResult::NotApplicable => {
                    info!(
                        remediation = remediation.name(),
                        check = remediation.check_name(),
                        "remediation not applicable, state already converged"
                    );
                }
                RemediationResult::Failed(reason) => {
                    warn!(
                        remediation = remediation.name(),
                        check = remediation.check_name(),
                        "remediation failed (will re-check next attempt): {reason}"
                    );
                }
            }
            outcomes.push((remediation.name().to_string(), result));
        }
        outcomes
    }
}
