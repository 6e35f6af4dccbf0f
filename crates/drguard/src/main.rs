//! drguard CLI.
//!
//! Every tunable is settable by flag or environment variable so the binary
//! drops into GitOps hooks unchanged: exit code 0 means every check passed,
//! 1 means attempts were exhausted or a terminal error occurred.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use drguard::checks::spec::CheckFile;
use drguard::client::k8s::KubeApiClient;
use drguard::config::ReconcilerConfig;
use drguard::driver::{ReconciliationDriver, RunReport};
use drguard::remediation::RemediationExecutor;
use drguard::scheduler::RetryPolicy;
use drguard::target::{KubeClientFactory, TargetResolver};
use drguard::{CheckContext, CheckSet, SharedClient};

/// Multi-cluster DR readiness reconciler.
#[derive(Parser)]
#[command(name = "drguard")]
#[command(about = "Polls managed clusters, evaluates readiness checks and remediates drift")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Hub namespace holding per-cluster kubeconfig secrets
    #[arg(
        long,
        global = true,
        env = "DRGUARD_HUB_NAMESPACE",
        default_value = "open-cluster-management"
    )]
    hub_namespace: String,

    /// Kubeconfig secret naming convention: <cluster>-<suffix>
    #[arg(
        long,
        global = true,
        env = "DRGUARD_SECRET_SUFFIX",
        default_value = "admin-kubeconfig"
    )]
    secret_suffix: String,

    /// Key inside the secret holding the kubeconfig
    #[arg(
        long,
        global = true,
        env = "DRGUARD_SECRET_KEY",
        default_value = "kubeconfig"
    )]
    secret_key: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile until all checks pass or attempts run out
    Run {
        /// Path to the YAML check-definition file
        #[arg(long, env = "DRGUARD_CHECKS")]
        checks: PathBuf,

        /// Maximum check-loop attempts
        #[arg(long, env = "DRGUARD_MAX_ATTEMPTS", default_value = "120")]
        max_attempts: u32,

        /// Seconds to sleep between attempts
        #[arg(long, env = "DRGUARD_INTERVAL_SECS", default_value = "30")]
        interval_secs: u64,

        /// Keep reconciling forever, re-running exhausted rounds
        #[arg(long, env = "DRGUARD_FOREVER")]
        forever: bool,

        /// Seconds to pause between forever-rounds
        #[arg(long, env = "DRGUARD_ROUND_PAUSE_SECS", default_value = "60")]
        round_pause_secs: u64,

        /// Evaluate checks without applying remediations
        #[arg(long, env = "DRGUARD_NO_REMEDIATE")]
        no_remediate: bool,

        /// Write the run report as JSON to this file
        #[arg(long, env = "DRGUARD_REPORT")]
        report: Option<PathBuf>,
    },
    /// Evaluate all checks once, without retries or remediation
    Check {
        /// Path to the YAML check-definition file
        #[arg(long, env = "DRGUARD_CHECKS")]
        checks: PathBuf,

        /// Write the run report as JSON to this file
        #[arg(long, env = "DRGUARD_REPORT")]
        report: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(
            cli.verbose,
            std::env::var("RUST_LOG").ok().as_deref(),
        ))
        .init();

    match run(cli).await {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            error!("drguard failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<RunReport> {
    let (config, checks_path, report_path) = build_config(&cli);
    config.validate().context("invalid configuration")?;

    let file = CheckFile::load(&checks_path)
        .with_context(|| format!("loading check definitions from {}", checks_path.display()))?;
    info!(
        checks = file.checks.len(),
        targets = file.targets.len(),
        "loaded check definitions"
    );

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let hub: SharedClient = std::sync::Arc::new(
        KubeApiClient::from_env()
            .await
            .context("building hub cluster client")?,
    );

    let resolver = TargetResolver::new(
        hub,
        Box::new(KubeClientFactory),
        config.hub_namespace.clone(),
        config.secret_suffix.clone(),
        config.secret_key.clone(),
        config.resolve_retry.clone(),
    );
    let targets = resolver.resolve_all(&file.targets, &cancel).await;
    let ctx = CheckContext::new(targets);

    let mut set = CheckSet::new();
    let mut executor = RemediationExecutor::new();
    for entry in file.checks {
        let check_name = entry.check.name().to_string();
        if let Some(remediation) = entry.remediation {
            executor.register(remediation.build(&check_name));
        }
        set.register(entry.check.build());
    }

    let driver = ReconciliationDriver::new(config, set, executor, ctx, cancel);
    let report = driver.run().await;

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report).context("serializing run report")?;
        std::fs::write(&path, json)
            .with_context(|| format!("writing run report to {}", path.display()))?;
        info!(path = %path.display(), "run report written");
    }
    Ok(report)
}

fn build_config(cli: &Cli) -> (ReconcilerConfig, PathBuf, Option<PathBuf>) {
    let mut config = ReconcilerConfig {
        hub_namespace: cli.hub_namespace.clone(),
        secret_suffix: cli.secret_suffix.clone(),
        secret_key: cli.secret_key.clone(),
        ..ReconcilerConfig::default()
    };
    match &cli.command {
        Commands::Run {
            checks,
            max_attempts,
            interval_secs,
            forever,
            round_pause_secs,
            no_remediate,
            report,
        } => {
            config.retry = RetryPolicy::fixed(*max_attempts, Duration::from_secs(*interval_secs));
            config.outer.repeat_forever = *forever;
            config.outer.pause = Duration::from_secs(*round_pause_secs);
            config.remediate = !no_remediate;
            (config, checks.clone(), report.clone())
        }
        Commands::Check { checks, report } => {
            (config.check_only(), checks.clone(), report.clone())
        }
    }
}

/// An explicit RUST_LOG always wins; --verbose only raises the default.
fn log_filter(verbose: bool, env_directive: Option<&str>) -> EnvFilter {
    match env_directive {
        Some(directive) => EnvFilter::new(directive),
        None if verbose => EnvFilter::new("drguard=debug"),
        None => EnvFilter::new("drguard=info"),
    }
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });
}
