//! deploy command - Mirror a local directory into a bucket
//!
//! Uploads new and changed files, deletes remote files and directories
//! that no longer exist locally, and purges CDN caches for synced paths.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Args;
use serde::Serialize;
use upsync_core::{
    Config, ConfigManager, FileAction, FileOutcome, ObjectStore, Reconciler, SyncReport,
};
use upsync_s3::S3Client;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

/// Mirror a local directory into a bucket
#[derive(Args, Debug, Default)]
pub struct DeployArgs {
    /// Target bucket
    #[arg(long)]
    pub bucket: Option<String>,

    /// Access key
    #[arg(long, env = "UPSYNC_OPERATOR")]
    pub operator: Option<String>,

    /// Secret key
    #[arg(long, env = "UPSYNC_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Local directory to publish
    #[arg(long)]
    pub local_dir: Option<PathBuf>,

    /// Remote prefix to publish under (default: bucket root)
    #[arg(long)]
    pub publish_dir: Option<String>,

    /// S3-compatible endpoint URL
    #[arg(long)]
    pub endpoint: Option<String>,

    #[arg(long)]
    pub region: Option<String>,

    /// CDN base URL that receives PURGE requests for synced paths
    #[arg(long)]
    pub purge_endpoint: Option<String>,

    /// Concurrent orphan-file deletions
    #[arg(long)]
    pub delete_workers: Option<usize>,

    /// Attempts per remote call, including the first
    #[arg(long)]
    pub retries: Option<u32>,

    /// Directory holding config.toml
    #[arg(long)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct DeployOutput<'a> {
    bucket: &'a str,
    publish_dir: &'a str,
    #[serde(flatten)]
    report: &'a SyncReport,
    elapsed_ms: u64,
}

/// Human-readable run summary
struct Summary<'a> {
    formatter: &'a Formatter,
    report: &'a SyncReport,
    elapsed_ms: u64,
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.report;
        let label = |text: &str| self.formatter.style_key(text);
        let bytes = humansize::format_size(r.bytes_uploaded, humansize::BINARY);
        let elapsed = jiff::SignedDuration::from_millis(self.elapsed_ms as i64);

        writeln!(f, "exists: {}, uploaded: {}", r.remote_files, r.processed)?;
        writeln!(
            f,
            "{} {} new, {} refreshed, {} cached, {} failed ({})",
            label("files:"),
            r.uploaded,
            r.refreshed,
            r.cached,
            r.failed,
            self.formatter.style_size(&bytes)
        )?;
        writeln!(
            f,
            "{} {} files, {} directories, {} failed",
            label("deleted:"),
            r.deleted_files,
            r.deleted_dirs,
            r.delete_failures.len()
        )?;
        writeln!(
            f,
            "{} {} paths, {} failed",
            label("purged:"),
            r.purged,
            r.purge_failures.len()
        )?;
        write!(f, "{} {elapsed:#}", label("elapsed:"))
    }
}

/// Execute the deploy command
pub async fn execute(args: DeployArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            formatter.error(&format!("{e:#}"));
            return ExitCode::UsageError;
        }
    };

    if let Err(e) = config.sync.validate() {
        formatter.error(&e.to_string());
        return ExitCode::from_error(&e);
    }

    let client = match S3Client::new(&config.store).await {
        Ok(client) => client,
        Err(e) => {
            formatter.error(&format!("Failed to create client: {e}"));
            return ExitCode::from_error(&e);
        }
    };

    let publish_root = config.sync.publish_root();
    let pb = formatter.spinner(&format!(
        "Syncing {} to {}",
        config.sync.local_dir.display(),
        formatter.style_name(&format!("{}/{}", config.store.bucket, config.sync.publish_dir))
    ));

    let progress_pb = pb.clone();
    let store: Arc<dyn ObjectStore> = Arc::new(client);
    let reconciler = Reconciler::new(store, config.sync.clone()).with_progress(Arc::new(
        move |outcome: &FileOutcome| {
            progress_pb.inc(1);
            progress_pb.set_message(format!("{} /{}", outcome.action, outcome.key));
            if outcome.action == FileAction::Failed {
                progress_pb.suspend(|| {
                    tracing::warn!(
                        path = %outcome.key,
                        error = outcome.error.as_deref().unwrap_or_default(),
                        "File not synced"
                    );
                });
            }
        },
    ));

    let started = Instant::now();
    let report = reconciler.run().await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    pb.finish_and_clear();

    if formatter.is_json() {
        formatter.json(&DeployOutput {
            bucket: &config.store.bucket,
            publish_dir: &publish_root,
            report: &report,
            elapsed_ms,
        });
    } else {
        formatter.println(
            &Summary {
                formatter: &formatter,
                report: &report,
                elapsed_ms,
            }
            .to_string(),
        );
        if report.failed > 0 || !report.delete_failures.is_empty() {
            formatter.warning("Some paths were not synced; run again to retry them");
        }
    }

    match &report.walk_error {
        Some(e) => {
            formatter.error(&format!("Local walk aborted: {e}"));
            ExitCode::GeneralError
        }
        None => {
            formatter.success("Deploy complete");
            ExitCode::Success
        }
    }
}

/// Load `config.toml` and layer the command-line flags over it
fn load_config(args: &DeployArgs) -> anyhow::Result<Config> {
    let manager = match &args.config_dir {
        Some(dir) => ConfigManager::with_dir(dir),
        None => ConfigManager::new().context("Failed to locate config directory")?,
    };
    let mut config = manager.load().with_context(|| {
        format!(
            "Failed to load config from {}",
            manager.config_path().display()
        )
    })?;

    apply_args(&mut config, args);
    config.store.validate().context("Invalid store configuration")?;
    Ok(config)
}

fn apply_args(config: &mut Config, args: &DeployArgs) {
    let store = &mut config.store;
    if let Some(bucket) = &args.bucket {
        store.bucket = bucket.clone();
    }
    if let Some(operator) = &args.operator {
        store.operator = operator.clone();
    }
    if let Some(password) = &args.password {
        store.password = password.clone();
    }
    if let Some(endpoint) = &args.endpoint {
        store.endpoint = endpoint.clone();
    }
    if let Some(region) = &args.region {
        store.region = region.clone();
    }
    if let Some(purge_endpoint) = &args.purge_endpoint {
        store.purge_endpoint = Some(purge_endpoint.clone());
    }

    let sync = &mut config.sync;
    match &args.local_dir {
        Some(local_dir) => sync.set_local_dir(local_dir),
        None => {
            let local_dir = sync.local_dir.clone();
            sync.set_local_dir(local_dir);
        }
    }
    let publish_dir = args
        .publish_dir
        .clone()
        .unwrap_or_else(|| sync.publish_dir.clone());
    sync.set_publish_dir(&publish_dir);
    if let Some(workers) = args.delete_workers {
        sync.delete_workers = workers;
    }
    if let Some(retries) = args.retries {
        sync.retry.max_attempts = retries;
    }
}
