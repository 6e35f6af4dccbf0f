//! Multi-cluster DR readiness reconciler.
//!
//! drguard polls a hub cluster and its managed clusters, evaluates a
//! declarative set of readiness checks (storage health, network
//! connectivity, certificate distribution, DR placement state) and applies
//! idempotent remediations when checks fail, retrying on a bounded budget
//! until the cluster set converges or attempts run out.
//!
//! The engine is generic: business checks live in a YAML check-definition
//! file, not in code. See [`checks::spec::CheckFile`] for the format and
//! [`driver::ReconciliationDriver`] for the run loop.

pub mod checks;
pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod remediation;
pub mod scheduler;
pub mod target;

pub use checks::spec::{CheckEntry, CheckFile, CheckSpec};
pub use checks::{Check, CheckContext, CheckOutcome, CheckResult, CheckSet};
pub use client::{
    ApiClient, GetOutcome, PatchStrategy, ResourceKey, SharedClient, WaitCondition, WaitOutcome,
};
pub use config::ReconcilerConfig;
pub use driver::{ReconciliationDriver, RunReport, RunVerdict};
pub use error::ClientError;
pub use remediation::{Remediation, RemediationExecutor, RemediationResult, RemediationSpec};
pub use scheduler::{
    BackoffPolicy, DelayPolicy, OuterPolicy, RetryPolicy, RetryScheduler, SchedulerOutcome,
};
pub use target::{ClientFactory, ClusterTarget, Reachability, TargetResolver, TargetSpec};
