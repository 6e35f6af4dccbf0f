//! Declarative check definitions.
//!
//! Business checks ("the ODF StorageCluster phase is Ready", "every cluster
//! carries the same trusted CA bundle") are data, not code: a YAML file of
//! [`CheckSpec`] entries plus the targets they run against. The engine only
//! knows the generic check kinds.
//!
//! ```yaml
//! targets:
//!   - name: hub
//!     local: true
//!   - name: dr1
//!   - name: dr2
//! checks:
//!   - type: field-equals
//!     name: storage-ready
//!     target: dr1
//!     resource:
//!       api-version: ocs.openshift.io/v1
//!       kind: StorageCluster
//!       namespace: openshift-storage
//!       name: ocs-storagecluster
//!     path: status.phase
//!     expected: Ready
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checks::artifact::{ArtifactContent, CrossTargetMatch};
use crate::checks::resource::{FieldEquals, MinListCount, ResourceExists};
use crate::checks::Check;
use crate::client::ResourceKey;
use crate::error::{ClientError, Result};
use crate::remediation::RemediationSpec;
use crate::target::TargetSpec;

fn default_data_path() -> String {
    "data".to_string()
}

fn default_api_version() -> String {
    "v1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum CheckSpec {
    ResourceExists {
        name: String,
        target: String,
        resource: ResourceKey,
    },
    FieldEquals {
        name: String,
        target: String,
        resource: ResourceKey,
        path: String,
        expected: Value,
        #[serde(default)]
        missing_is_pass: bool,
    },
    MinListCount {
        name: String,
        target: String,
        #[serde(default = "default_api_version")]
        api_version: String,
        kind: String,
        #[serde(default)]
        namespace: Option<String>,
        #[serde(default)]
        label_selector: Option<String>,
        min: usize,
    },
    ArtifactContent {
        name: String,
        target: String,
        resource: ResourceKey,
        #[serde(default = "default_data_path")]
        path: String,
        key: String,
        #[serde(default)]
        min_bytes: usize,
        #[serde(default)]
        required_markers: Vec<String>,
    },
    CrossTargetMatch {
        name: String,
        targets: Vec<String>,
        resource: ResourceKey,
        #[serde(default = "default_data_path")]
        path: String,
        key: String,
        #[serde(default)]
        min_bytes: usize,
    },
}

impl CheckSpec {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            CheckSpec::ResourceExists { name, .. }
            | CheckSpec::FieldEquals { name, .. }
            | CheckSpec::MinListCount { name, .. }
            | CheckSpec::ArtifactContent { name, .. }
            | CheckSpec::CrossTargetMatch { name, .. } => name,
        }
    }

    #[must_use]
    pub fn build(self) -> Box<dyn Check> {
        match self {
            CheckSpec::ResourceExists {
                name,
                target,
                resource,
            } => Box::new(ResourceExists {
                name,
                target,
                resource,
            }),
            CheckSpec::FieldEquals {
                name,
                target,
                resource,
                path,
                expected,
                missing_is_pass,
            } => Box::new(FieldEquals {
                name,
                target,
                resource,
                path,
                expected,
                missing_is_pass,
            }),
            CheckSpec::MinListCount {
                name,
                target,
                api_version,
                kind,
                namespace,
                label_selector,
                min,
            } => Box::new(MinListCount {
                name,
                target,
                api_version,
                kind,
                namespace,
                label_selector,
                min,
            }),
            CheckSpec::ArtifactContent {
                name,
                target,
                resource,
                path,
                key,
                min_bytes,
                required_markers,
            } => Box::new(ArtifactContent {
                name,
                target,
                resource,
                path,
                key,
                min_bytes,
                required_markers,
            }),
            CheckSpec::CrossTargetMatch {
                name,
                targets,
                resource,
                path,
                key,
                min_bytes,
            } => Box::new(CrossTargetMatch {
                name,
                targets,
                resource,
                path,
                key,
                min_bytes,
            }),
        }
    }
}

/// One check plus its optional remediation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckEntry {
    #[serde(flatten)]
    pub check: CheckSpec,
    #[serde(default)]
    pub remediation: Option<RemediationSpec>,
}

/// The whole check-definition file: targets and checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckFile {
    pub targets: Vec<TargetSpec>,
    pub checks: Vec<CheckEntry>,
}

impl CheckFile {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: CheckFile = serde_yaml::from_str(text)
            .map_err(|e| ClientError::Config(format!("invalid check definitions: {e}")))?;
        file.validate()?;
        Ok(file)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("cannot read check file {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.checks.is_empty() {
            return Err(ClientError::Config(
                "check file declares no checks".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &self.checks {
            if !seen.insert(entry.check.name()) {
                return Err(ClientError::Config(format!(
                    "duplicate check name '{}'",
                    entry.check.name()
                )));
            }
            for target in referenced_targets(&entry.check) {
                if !self.targets.iter().any(|t| t.name == target) {
                    return Err(ClientError::Config(format!(
                        "check '{}' references undeclared target '{target}'",
                        entry.check.name()
                    )));
                }
            }
        }
        Ok(())
    }
}

fn referenced_targets(spec: &CheckSpec) -> Vec<String> {
    match spec {
        CheckSpec::ResourceExists { target, .. }
        | CheckSpec::FieldEquals { target, .. }
        | CheckSpec::MinListCount { target, .. }
        | CheckSpec::ArtifactContent { target, .. } => vec![target.clone()],
        CheckSpec::CrossTargetMatch { targets, .. } => targets.clone(),
    }
}
