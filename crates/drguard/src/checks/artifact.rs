//! Artifact content checks: CA bundles and similar distributed blobs.
//!
//! The artifact is a string value stored under a literal key inside a map
//! field (ConfigMap `data`, Secret `data`). The key is looked up verbatim,
//! not dot-projected, because artifact keys routinely contain dots
//! (`ca-bundle.crt`).
//!
//! Size gating is unconditional: an empty or undersized artifact fails
//! regardless of what it contains.

use async_trait::async_trait;
use serde_json::Value;

use crate::checks::{Check, CheckContext, CheckResult};
use crate::client::{projection, GetOutcome, ResourceKey, SharedClient};

/// Fetch one artifact string from one target. Shared by both checks below.
async fn fetch_artifact(
    client: &SharedClient,
    resource: &ResourceKey,
    path: &str,
    key: &str,
    target: &str,
) -> Result<String, CheckResult> {
    let obj = match client.get(resource).await {
        Ok(GetOutcome::Found(obj)) => obj,
        Ok(GetOutcome::NotFound) => {
            return Err(CheckResult::indeterminate(format!(
                "{resource} not found on {target}"
            )));
        }
        Err(err) => return Err(CheckResult::from_client_error(&err)),
    };
    let Some(map) = projection::project(&obj, path).and_then(Value::as_object) else {
        return Err(CheckResult::fail(format!(
            "{resource} has no '{path}' map on {target}"
        )));
    };
    match map.get(key).and_then(Value::as_str) {
        Some(content) => Ok(content.to_string()),
        None => Err(CheckResult::fail(format!(
            "{resource} has no '{key}' entry under '{path}' on {target}"
        ))),
    }
}

fn undersized(content: &str, min_bytes: usize) -> Option<String> {
    if content.len() < min_bytes {
        Some(format!(
            "expected at least {min_bytes} bytes, observed {}",
            content.len()
        ))
    } else {
        None
    }
}

/// Single-target artifact check: minimum size plus required markers.
pub struct ArtifactContent {
    pub name: String,
    pub target: String,
    pub resource: ResourceKey,
    /// Dot-path to the map holding the artifact, typically `data`.
    pub path: String,
    /// Literal key of the artifact inside that map.
    pub key: String,
    pub min_bytes: usize,
    /// Substrings that must all be present, e.g. one marker per expected
    /// certificate source.
    pub required_markers: Vec<String>,
}

#[async_trait]
impl Check for ArtifactContent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, ctx: &CheckContext) -> CheckResult {
        let client = match ctx.client_for(&self.target) {
            Ok(client) => client,
            Err(result) => return result,
        };
        let content =
            match fetch_artifact(client, &self.resource, &self.path, &self.key, &self.target).await
            {
                Ok(content) => content,
                Err(result) => return result,
            };
        if let Some(reason) = undersized(&content, self.min_bytes) {
            return CheckResult::fail(format!(
                "{} '{}' undersized on {}: {reason}",
                self.resource, self.key, self.target
            ))
            .with_data(Value::from(content.len()));
        }
        let missing: Vec<&str> = self
            .required_markers
            .iter()
            .filter(|marker| !content.contains(marker.as_str()))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            CheckResult::pass(format!(
                "{} '{}' on {}: {} bytes, all {} markers present",
                self.resource,
                self.key,
                self.target,
                content.len(),
                self.required_markers.len()
            ))
            .with_data(Value::from(content.len()))
        } else {
            CheckResult::fail(format!(
                "{} '{}' on {} is missing markers: {}",
                self.resource,
                self.key,
                self.target,
                missing.join(", ")
            ))
            .with_data(Value::from(content.len()))
        }
    }
}

/// Composite cross-target check: the same artifact must be byte-identical on
/// every listed target. Undersized artifacts fail before any comparison.
pub struct CrossTargetMatch {
    pub name: String,
    pub targets: Vec<String>,
    pub resource: ResourceKey,
    pub path: String,
    pub key: String,
    pub min_bytes: usize,
}

#[async_trait]
impl Check for CrossTargetMatch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, ctx: &CheckContext) -> CheckResult {
        if self.targets.len() < 2 {
            return CheckResult::fail(format!(
                "cross-target check '{}' needs at least two targets",
                self.name
            ));
        }
        let mut artifacts: Vec<(String, String)> = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let client = match ctx.client_for(target) {
                Ok(client) => client,
                Err(result) => return result,
            };
            let content =
                match fetch_artifact(client, &self.resource, &self.path, &self.key, target).await {
                    Ok(content) => content,
                    Err(result) => return result,
                };
            if let Some(reason) = undersized(&content, self.min_bytes) {
                return CheckResult::fail(format!(
                    "{} '{}' undersized on {target}: {reason}",
                    self.resource, self.key
                ));
            }
            artifacts.push((target.clone(), content));
        }

        let (reference_target, reference) = &artifacts[0];
        for (target, content) in &artifacts[1..] {
            if content != reference {
                return CheckResult::fail(format!(
                    "{} '{}' differs between {reference_target} ({} bytes) and {target} ({} bytes)",
                    self.resource,
                    self.key,
                    reference.len(),
                    content.len()
                ));
            }
        }
        CheckResult::pass(format!(
            "{} '{}' identical across {} targets ({} bytes)",
            self.resource,
            self.key,
            artifacts.len(),
            reference.len()
        ))
        .with_data(Value::from(reference.len()))
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

    struct BundleClient {
        bundle: Option<String>,
    }

    #[async_trait]
    impl ApiClient for BundleClient {
        async fn get(&self, _key: &ResourceKey) -> Result<GetOutcome> {
            Ok(match &self.bundle {
                Some(content) => GetOutcome::Found(json!({"data": {"ca-bundle.crt": content}})),
                None => GetOutcome::NotFound,
            })
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
            Err(ClientError::Transient("read-only".into()))
        }

        async fn create(&self, _key: &ResourceKey, _spec: &Value) -> Result<Value> {
            Err(ClientError::Transient("read-only".into()))
        }

        async fn delete(&self, _key: &ResourceKey) -> Result<()> {
            Err(ClientError::Transient("read-only".into()))
        }
    }

    fn bundle_key() -> ResourceKey {
        ResourceKey::core("ConfigMap", "openshift-config", "trusted-ca-bundle")
    }

    fn ctx_with_bundles(bundles: &[(&str, Option<&str>)]) -> CheckContext {
        let targets = bundles
            .iter()
            .map(|(name, bundle)| {
                let client = Arc::new(BundleClient {
                    bundle: bundle.map(String::from),
                });
                ClusterTarget::resolved(*name, client as SharedClient)
            })
            .collect();
        CheckContext::new(targets)
    }

    fn content_check(min_bytes: usize, markers: Vec<String>) -> ArtifactContent {
        ArtifactContent {
            name: "ca-bundle-complete".into(),
            target: "hub".into(),
            resource: bundle_key(),
            path: "data".into(),
            key: "ca-bundle.crt".into(),
            min_bytes,
            required_markers: markers,
        }
    }

    #[tokio::test]
    async fn undersized_artifact_fails_regardless_of_markers() {
        let ctx = ctx_with_bundles(&[("hub", Some("hub-ca"))]);
        // Content carries the marker, but size gating wins.
        let check = content_check(100, vec!["hub-ca".into()]);
        let result = check.evaluate(&ctx).await;
        assert_eq!(result.outcome, CheckOutcome::Fail);
        assert!(result.diagnostic.contains("at least 100 bytes"));
        assert!(result.diagnostic.contains("observed 6"));
    }

    #[tokio::test]
    async fn artifact_with_all_markers_at_minimum_passes() {
        let bundle = "cert-for-hub cert-for-dr1 cert-for-dr2";
        let ctx = ctx_with_bundles(&[("hub", Some(bundle))]);
        let check = content_check(
            bundle.len(),
            vec![
                "cert-for-hub".into(),
                "cert-for-dr1".into(),
                "cert-for-dr2".into(),
            ],
        );
        let result = check.evaluate(&ctx).await;
        assert_eq!(result.outcome, CheckOutcome::Pass);
    }

    #[tokio::test]
    async fn missing_markers_are_named_in_diagnostic() {
        let ctx = ctx_with_bundles(&[("hub", Some("cert-for-hub only"))]);
        let check = content_check(1, vec!["cert-for-hub".into(), "cert-for-dr1".into()]);
        let result = check.evaluate(&ctx).await;
        assert_eq!(result.outcome, CheckOutcome::Fail);
        assert!(result.diagnostic.contains("cert-for-dr1"));
        assert!(!result.diagnostic.contains("missing markers: cert-for-hub"));
    }

    #[tokio::test]
    async fn missing_artifact_resource_is_indeterminate() {
        let ctx = ctx_with_bundles(&[("hub", None)]);
        let check = content_check(1, vec![]);
        let result = check.evaluate(&ctx).await;
        assert_eq!(result.outcome, CheckOutcome::Indeterminate);
    }

    #[tokio::test]
    async fn cross_target_mismatch_names_a_mismatched_pair() {
        let bundle = "shared-bundle-contents-aaaa";
        let tweaked = "shared-bundle-contents-aaab";
        let ctx = ctx_with_bundles(&[
            ("hub", Some(bundle)),
            ("dr1", Some(bundle)),
            ("dr2", Some(tweaked)),
        ]);
        let check = CrossTargetMatch {
            name: "ca-bundles-match".into(),
            targets: vec!["hub".into(), "dr1".into(), "dr2".into()],
            resource: bundle_key(),
            path: "data".into(),
            key: "ca-bundle.crt".into(),
            min_bytes: 1,
        };
        let result = check.evaluate(&ctx).await;
        assert_eq!(result.outcome, CheckOutcome::Fail);
        assert!(result.diagnostic.contains("dr2"));
        assert!(result.diagnostic.contains("differs"));
    }

    #[tokio::test]
    async fn cross_target_identical_bundles_pass() {
        let bundle = "shared-bundle-contents";
        let ctx = ctx_with_bundles(&[("hub", Some(bundle)), ("dr1", Some(bundle))]);
        let check = CrossTargetMatch {
            name: "ca-bundles-match".into(),
            targets: vec!["hub".into(), "dr1".into()],
            resource: bundle_key(),
            path: "data".into(),
            key: "ca-bundle.crt".into(),
            min_bytes: 1,
        };
        let result = check.evaluate(&ctx).await;
        assert_eq!(result.outcome, CheckOutcome::Pass);
    }

    #[tokio::test]
    async fn cross_target_check_fails_fast_on_unresolved_target() {
        let mut ctx_targets = vec![];
        ctx_targets.push(ClusterTarget::resolved(
            "hub",
            Arc::new(BundleClient {
                bundle: Some("bundle".into()),
            }) as SharedClient,
        ));
        ctx_targets.push(ClusterTarget::unresolved(
            "dr1",
            "credential resolution failed for target 'dr1': secret missing",
        ));
        let ctx = CheckContext::new(ctx_targets);
        let check = CrossTargetMatch {
            name: "ca-bundles-match".into(),
            targets: vec!["hub".into(), "dr1".into()],
            resource: bundle_key(),
            path: "data".into(),
            key: "ca-bundle.crt".into(),
            min_bytes: 1,
        };
        let result = check.evaluate(&ctx).await;
        assert_eq!(result.outcome, CheckOutcome::Fail);
        assert!(result.diagnostic.contains("credential resolution failed"));
    }
}
