//! Generic single-resource checks.
//!
//! These cover the common readiness shapes: "the resource exists", "a status
//! field has the expected value" (storage cluster phase, DR placement state,
//! GitOps sync policy), and "at least N resources match a selector" (daemon
//! pods running on every node).

use async_trait::async_trait;
use serde_json::Value;

use crate::checks::{Check, CheckContext, CheckResult};
use crate::client::{projection, GetOutcome, ResourceKey};

/// Pass when the resource exists; NotFound is the negative observation.
pub struct ResourceExists {
    pub name: String,
    pub target: String,
    pub resource: ResourceKey,
}

#[async_trait]
impl Check for ResourceExists {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, ctx: &CheckContext) -> CheckResult {
        let client = match ctx.client_for(&self.target) {
            Ok(client) => client,
            Err(result) => return result,
        };
        match client.get(&self.resource).await {
            Ok(GetOutcome::Found(_)) => {
                CheckResult::pass(format!("{} exists on {}", self.resource, self.target))
            }
            Ok(GetOutcome::NotFound) => CheckResult::fail(format!(
                "{} not found on {}",
                self.resource, self.target
            )),
            Err(err) => CheckResult::from_client_error(&err),
        }
    }
}

/// Pass when a projected field equals the expected value.
///
/// A missing resource is Indeterminate (could not evaluate). A missing field
/// is Fail unless `missing_is_pass` opts this definition into treating an
/// absent condition as satisfied; the engine default is Fail.
pub struct FieldEquals {
    pub name: String,
    pub target: String,
    pub resource: ResourceKey,
    pub path: String,
    pub expected: Value,
    pub missing_is_pass: bool,
}

#[async_trait]
impl Check for FieldEquals {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, ctx: &CheckContext) -> CheckResult {
        let client = match ctx.client_for(&self.target) {
            Ok(client) => client,
            Err(result) => return result,
        };
        let obj = match client.get(&self.resource).await {
            Ok(GetOutcome::Found(obj)) => obj,
            Ok(GetOutcome::NotFound) => {
                return CheckResult::indeterminate(format!(
                    "{} not found on {}, cannot evaluate '{}'",
                    self.resource, self.target, self.path
                ));
            }
            Err(err) => return CheckResult::from_client_error(&err),
        };
        match projection::project(&obj, &self.path) {
            Some(actual) if *actual == self.expected => CheckResult::pass(format!(
                "{} {}='{}' on {}",
                self.resource, self.path, self.expected, self.target
            ))
            .with_data(actual.clone()),
            Some(actual) => CheckResult::fail(format!(
                "{} {} expected '{}', observed '{}' on {}",
                self.resource, self.path, self.expected, actual, self.target
            ))
            .with_data(actual.clone()),
            None if self.missing_is_pass => CheckResult::pass(format!(
                "{} has no '{}' field on {} (absent counts as satisfied for this check)",
                self.resource, self.path, self.target
            )),
            None => CheckResult::fail(format!(
                "{} has no '{}' field on {}, expected '{}'",
                self.resource, self.path, self.target, self.expected
            )),
        }
    }
}

/// Pass when at least `min` resources match the selector.
pub struct MinListCount {
    pub name: String,
    pub target: String,
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
    pub min: usize,
}

#[async_trait]
impl Check for MinListCount {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, ctx: &CheckContext) -> CheckResult {
        let client = match ctx.client_for(&self.target) {
            Ok(client) => client,
            Err(result) => return result,
        };
        let items = match client
            .list(
                &self.api_version,
                &self.kind,
                self.namespace.as_deref(),
                self.label_selector.as_deref(),
            )
            .await
        {
            Ok(items) => items,
            Err(err) => return CheckResult::from_client_error(&err),
        };
        let selector = self.label_selector.as_deref().unwrap_or("<all>");
        if items.len() >= self.min {
            CheckResult::pass(format!(
                "{} {} matching '{}' on {} (minimum {})",
                items.len(),
                self.kind,
                selector,
                self.target,
                self.min
            ))
            .with_data(Value::from(items.len()))
        } else {
            CheckResult::fail(format!(
                "only {} {} matching '{}' on {}, expected at least {}",
                items.len(),
                self.kind,
                selector,
                self.target,
                self.min
            ))
            .with_data(Value::from(items.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::CheckOutcome;
    use crate::client::{ApiClient, PatchStrategy};
    use crate::error::{ClientError, Result};
    use crate::target::ClusterTarget;
    use serde_json::json;
    use std::sync::Arc;

    struct OneResource {
        obj: Option<Value>,
    }

    #[async_trait]
    impl ApiClient for OneResource {
        async fn get(&self, _key: &ResourceKey) -> Result<GetOutcome> {
            Ok(self
                .obj
                .clone()
                .map_or(GetOutcome::NotFound, GetOutcome::Found))
        }

        async fn list(
            &self,
            _api_version: &str,
            _kind: &str,
            _namespace: Option<&str>,
            _label_selector: Option<&str>,
        ) -> Result<Vec<Value>> {
            Ok(self.obj.clone().into_iter().collect())
        }

        async fn patch(
            &self,
            _key: &ResourceKey,
            _patch: &Value,
            _strategy: PatchStrategy,
        ) -> Result<Value> {
            Err(ClientError::Transient("read-only".into()))
        }

        async fn create(&self, _key: &ResourceKey, _spec: &Value) -> Result<Value> {
            Err(ClientError::Transient("read-only".into()))
        }

        async fn delete(&self, _key: &ResourceKey) -> Result<()> {
            Err(ClientError::Transient("read-only".into()))
        }
    }

    fn ctx_with(obj: Option<Value>) -> CheckContext {
        let client = Arc::new(OneResource { obj });
        CheckContext::new(vec![ClusterTarget::resolved("dr1", client)])
    }

    fn storage_cluster_key() -> ResourceKey {
        ResourceKey::new(
            "ocs.openshift.io/v1",
            "StorageCluster",
            Some("openshift-storage"),
            "ocs-storagecluster",
        )
    }

    #[tokio::test]
    async fn field_equals_passes_on_expected_phase() {
        let ctx = ctx_with(Some(json!({"status": {"phase": "Ready"}})));
        let check = FieldEquals {
            name: "storage-ready".into(),
            target: "dr1".into(),
            resource: storage_cluster_key(),
            path: "status.phase".into(),
            expected: json!("Ready"),
            missing_is_pass: false,
        };
        let result = check.evaluate(&ctx).await;
        assert_eq!(result.outcome, CheckOutcome::Pass);
        assert_eq!(result.data, Some(json!("Ready")));
    }

    #[tokio::test]
    async fn field_equals_diagnostic_names_expected_and_observed() {
        let ctx = ctx_with(Some(json!({"status": {"phase": "Progressing"}})));
        let check = FieldEquals {
            name: "storage-ready".into(),
            target: "dr1".into(),
            resource: storage_cluster_key(),
            path: "status.phase".into(),
            expected: json!("Ready"),
            missing_is_pass: false,
        };
        let result = check.evaluate(&ctx).await;
        assert_eq!(result.outcome, CheckOutcome::Fail);
        assert!(result.diagnostic.contains("Ready"));
        assert!(result.diagnostic.contains("Progressing"));
    }

    #[tokio::test]
    async fn field_equals_missing_resource_is_indeterminate() {
        let ctx = ctx_with(None);
        let check = FieldEquals {
            name: "storage-ready".into(),
            target: "dr1".into(),
            resource: storage_cluster_key(),
            path: "status.phase".into(),
            expected: json!("Ready"),
            missing_is_pass: false,
        };
        let result = check.evaluate(&ctx).await;
        assert_eq!(result.outcome, CheckOutcome::Indeterminate);
        assert!(result.diagnostic.contains("not found"));
    }

    #[tokio::test]
    async fn field_equals_missing_field_honors_per_check_policy() {
        let ctx = ctx_with(Some(json!({"status": {}})));
        let strict = FieldEquals {
            name: "strict".into(),
            target: "dr1".into(),
            resource: storage_cluster_key(),
            path: "status.phase".into(),
            expected: json!("Ready"),
            missing_is_pass: false,
        };
        assert_eq!(strict.evaluate(&ctx).await.outcome, CheckOutcome::Fail);

        let lenient = FieldEquals {
            name: "lenient".into(),
            target: "dr1".into(),
            resource: storage_cluster_key(),
            path: "status.phase".into(),
            expected: json!("Ready"),
            missing_is_pass: true,
        };
        assert_eq!(lenient.evaluate(&ctx).await.outcome, CheckOutcome::Pass);
    }

    #[tokio::test]
    async fn resource_exists_fails_on_not_found() {
        let ctx = ctx_with(None);
        let check = ResourceExists {
            name: "drpc-present".into(),
            target: "dr1".into(),
            resource: storage_cluster_key(),
        };
        let result = check.evaluate(&ctx).await;
        assert_eq!(result.outcome, CheckOutcome::Fail);
        assert!(result.diagnostic.contains("not found"));
    }

    #[tokio::test]
    async fn min_list_count_fails_below_minimum() {
        let ctx = ctx_with(Some(json!({"metadata": {"name": "gw-1"}})));
        let check = MinListCount {
            name: "gateways-up".into(),
            target: "dr1".into(),
            api_version: "v1".into(),
            kind: "Pod".into(),
            namespace: Some("submariner-operator".into()),
            label_selector: Some("app=submariner-gateway".into()),
            min: 2,
        };
        let result = check.evaluate(&ctx).await;
        assert_eq!(result.outcome, CheckOutcome::Fail);
        assert!(result.diagnostic.contains("at least 2"));
        assert_eq!(result.data, Some(json!(1)));
    }

    #[tokio::test]
    async fn checks_against_unknown_target_fail_with_target_diagnostic() {
        let ctx = CheckContext::new(vec![]);
        let check = ResourceExists {
            name: "drpc-present".into(),
            target: "dr9".into(),
            resource: storage_cluster_key(),
        };
        let result = check.evaluate(&ctx).await;
        assert_eq!(result.outcome, CheckOutcome::Fail);
        assert!(result.diagnostic.contains("dr9"));
    }
}
