//! Reconciliation of a local tree with a remote prefix
//!
//! A run proceeds in phases, each finishing before the next starts:
//!
//! 1. List the remote tree under the publish prefix.
//! 2. Walk the local tree. Each discovered file claims its target key out of
//!    the orphan candidates and is synced by its own task.
//! 3. Wait for every file task.
//! 4. Delete orphan files through a bounded worker pool. Skipped, along
//!    with step 6, when the local walk failed before finding any file.
//! 5. Purge CDN caches for the paths confirmed present remotely.
//! 6. Remove orphan directories, deepest first.
//!
//! Per-object failures are logged and counted, never fatal to the run.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

use crate::cache;
use crate::config::{RetryConfig, SyncConfig};
use crate::error::{Error, Result};
use crate::lister::{RemoteTree, TreeLister};
use crate::path;
use crate::prune::DirectoryPruner;
use crate::retry::{always_retry, retry_unless_not_found, retry_with_delay};
use crate::traits::ObjectStore;
use crate::walker::{LocalFile, LocalWalker};

/// What happened to a single local file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    /// Not present remotely; uploaded
    Uploaded,
    /// Present but stale; deleted and uploaded again
    Refreshed,
    /// Already up to date; nothing written
    Cached,
    /// Left untouched after an error
    Failed,
}

impl std::fmt::Display for FileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileAction::Uploaded => write!(f, "uploaded"),
            FileAction::Refreshed => write!(f, "refreshed"),
            FileAction::Cached => write!(f, "cached"),
            FileAction::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    /// Canonical target key
    pub key: String,
    pub action: FileAction,
    /// Bytes written remotely
    pub bytes: u64,
    pub error: Option<String>,
}

impl FileOutcome {
    fn done(key: String, action: FileAction, bytes: u64) -> Self {
        Self {
            key,
            action,
            bytes,
            error: None,
        }
    }

    fn failed(key: String, error: &Error) -> Self {
        Self {
            key,
            action: FileAction::Failed,
            bytes: 0,
            error: Some(error.to_string()),
        }
    }

    /// Whether the target key is known to hold the local content
    pub fn is_synced(&self) -> bool {
        self.action != FileAction::Failed
    }
}

/// Summary of a sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Remote files found under the publish prefix before the run
    pub remote_files: usize,
    /// Local files considered
    pub processed: usize,
    pub uploaded: usize,
    pub refreshed: usize,
    pub cached: usize,
    pub failed: usize,
    pub bytes_uploaded: u64,
    pub deleted_files: usize,
    pub deleted_dirs: usize,
    /// Orphan files and directories that could not be removed
    pub delete_failures: Vec<String>,
    pub purged: usize,
    pub purge_failures: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub walk_error: Option<String>,
}

impl SyncReport {
    fn record(&mut self, outcome: &FileOutcome) {
        match outcome.action {
            FileAction::Uploaded => self.uploaded += 1,
            FileAction::Refreshed => self.refreshed += 1,
            FileAction::Cached => self.cached += 1,
            FileAction::Failed => self.failed += 1,
        }
        self.bytes_uploaded += outcome.bytes;
    }
}

/// Remote state still to be decided during a run
///
/// Starts out as the full remote snapshot; every local file claims its own
/// key and the directories above it. Whatever remains unclaimed is orphaned.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationPlan {
    pub orphan_files: HashMap<String, usize>,
    pub orphan_directories: HashMap<String, usize>,
}

impl ReconciliationPlan {
    /// Seed the plan from a remote snapshot listed at `root`
    ///
    /// Neither the bucket root nor the publish root is ever an orphan.
    pub fn new(remote: RemoteTree, root: &str) -> Self {
        let root = path::normalize(root);
        let mut orphan_directories = remote.directories;
        orphan_directories.retain(|dir, _| *dir != root && !path::is_root(dir));

        Self {
            orphan_files: remote.files,
            orphan_directories,
        }
    }

    /// Rescue a local file's target key, and every directory above it,
    /// from deletion
    pub fn claim(&mut self, key: &str) {
        let key = path::normalize(key);
        self.orphan_files.remove(&key);
        for dir in path::ancestors(&key) {
            self.orphan_directories.remove(&dir);
        }
    }
}

/// Callback invoked as each file finishes
pub type ProgressFn = Arc<dyn Fn(&FileOutcome) + Send + Sync>;

/// Mirrors a local tree into an object store
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    config: SyncConfig,
    progress: Option<ProgressFn>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ObjectStore>, config: SyncConfig) -> Self {
        Self {
            store,
            config,
            progress: None,
        }
    }

    /// Report each file outcome as it completes
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run a full sync
    pub async fn run(&self) -> SyncReport {
        let root = self.config.publish_root();
        let remote = TreeLister::new(
            Arc::clone(&self.store),
            self.config.retry,
            self.config.list_page_size,
        )
        .list_all(&root)
        .await;

        let mut report = SyncReport {
            remote_files: remote.files.len(),
            ..Default::default()
        };
        let mut plan = ReconciliationPlan::new(remote, &root);

        let outcomes = self.sync_local_files(&mut plan, &mut report).await;

        let mut synced: Vec<String> = outcomes
            .iter()
            .filter(|o| o.is_synced())
            .map(|o| path::to_remote(&o.key))
            .collect();
        synced.sort();

        tracing::info!(
            exists = report.remote_files,
            uploaded = report.processed,
            "Local files processed"
        );

        // A walk that failed before yielding anything claimed nothing, so
        // every remote path would look orphaned
        let remove_orphans = report.walk_error.is_none() || report.processed > 0;
        if remove_orphans {
            let orphan_files = std::mem::take(&mut plan.orphan_files);
            self.delete_orphan_files(orphan_files, &mut report).await;
        } else {
            tracing::warn!(
                files = plan.orphan_files.len(),
                directories = plan.orphan_directories.len(),
                "Local walk found nothing; keeping remote orphans"
            );
        }

        self.purge(&synced, &mut report).await;

        if remove_orphans {
            let pruned = DirectoryPruner::new(Arc::clone(&self.store), self.config.retry)
                .prune(&plan.orphan_directories)
                .await;
            report.deleted_dirs = pruned.deleted.len();
            report.delete_failures.extend(pruned.failed);
        }

        report
    }

    /// Walk the local tree, spawning one sync task per file, and wait for
    /// all of them
    async fn sync_local_files(
        &self,
        plan: &mut ReconciliationPlan,
        report: &mut SyncReport,
    ) -> Vec<FileOutcome> {
        let (tx, mut rx) = mpsc::channel::<Result<LocalFile>>(64);
        let local_dir: PathBuf = self.config.local_dir.clone();

        let walk = tokio::task::spawn_blocking(move || {
            for entry in LocalWalker::new(local_dir) {
                let failed = entry.is_err();
                if tx.blocking_send(entry).is_err() || failed {
                    break;
                }
            }
        });

        let mut tasks = JoinSet::new();
        let mut outcomes = Vec::new();
        while let Some(entry) = rx.recv().await {
            let file = match entry {
                Ok(file) => file,
                Err(e) => {
                    tracing::error!(error = %e, "Local walk aborted");
                    report.walk_error = Some(e.to_string());
                    break;
                }
            };

            let key = path::target_key(&self.config.publish_dir, &file.relative_path);
            plan.claim(&key);
            report.processed += 1;

            let span = tracing::info_span!("sync_file", path = %path::to_remote(&key));
            tasks.spawn(
                sync_file(
                    Arc::clone(&self.store),
                    self.config.retry,
                    self.config.async_delete,
                    file,
                    key,
                )
                .instrument(span),
            );

            while let Some(joined) = tasks.try_join_next() {
                self.finish_file(joined, report, &mut outcomes);
            }
        }
        drop(rx);

        if let Err(e) = walk.await {
            tracing::error!(error = %e, "Local walk task failed");
            if report.walk_error.is_none() {
                report.walk_error = Some(e.to_string());
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.finish_file(joined, report, &mut outcomes);
        }

        outcomes
    }

    /// Count a finished file task and report its progress
    fn finish_file(
        &self,
        joined: std::result::Result<FileOutcome, JoinError>,
        report: &mut SyncReport,
        outcomes: &mut Vec<FileOutcome>,
    ) {
        match joined {
            Ok(outcome) => {
                report.record(&outcome);
                if let Some(progress) = &self.progress {
                    progress(&outcome);
                }
                outcomes.push(outcome);
            }
            Err(e) => {
                tracing::error!(error = %e, "File task did not complete");
                report.failed += 1;
            }
        }
    }

    /// Delete orphan files with at most `delete_workers` in flight
    async fn delete_orphan_files(&self, files: HashMap<String, usize>, report: &mut SyncReport) {
        if files.is_empty() {
            return;
        }
        tracing::info!(count = files.len(), "Deleting orphan files");

        let mut keys: Vec<String> = files.into_keys().collect();
        keys.sort();

        let store = self.store.as_ref();
        let retry = &self.config.retry;
        let asynchronous = self.config.async_delete;

        let results: Vec<(String, Result<()>)> = futures::stream::iter(keys)
            .map(|key| async move {
                let remote = path::to_remote(&key);
                let result = delete_file(store, retry, &remote, asynchronous).await;
                (remote, result)
            })
            .buffer_unordered(self.config.delete_workers)
            .collect()
            .await;

        for (remote, result) in results {
            match result {
                Ok(()) => {
                    tracing::info!(path = %remote, "Deleted");
                    report.deleted_files += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %remote, error = %e, "Delete failed");
                    report.delete_failures.push(remote);
                }
            }
        }
    }

    async fn purge(&self, synced: &[String], report: &mut SyncReport) {
        if synced.is_empty() {
            return;
        }

        match self.store.purge(synced).await {
            Ok(failed) => {
                if !failed.is_empty() {
                    tracing::warn!(failed = ?failed, "Purge failed for some paths");
                }
                report.purged = synced.len().saturating_sub(failed.len());
                report.purge_failures = failed;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Purge failed");
                report.purge_failures = synced.to_vec();
            }
        }
    }
}

/// Bring one remote object in line with a local file
async fn sync_file(
    store: Arc<dyn ObjectStore>,
    retry: RetryConfig,
    async_delete: bool,
    file: LocalFile,
    key: String,
) -> FileOutcome {
    let store = store.as_ref();
    let remote = path::to_remote(&key);

    let data = match file.read().await {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(error = %e, "Read file failed");
            return FileOutcome::failed(key, &e);
        }
    };
    let content_type = cache::detect_content_type(&file.absolute_path, &data);

    let existing = retry_with_delay(
        &retry,
        || store.head_object(&remote),
        retry_unless_not_found,
    )
    .await;

    let action = match existing {
        Err(e) if e.is_not_found() => FileAction::Uploaded,
        Err(e) => {
            tracing::warn!(error = %e, "Get file info failed");
            return FileOutcome::failed(key, &e);
        }
        Ok(meta) if cache::should_skip(Some(&meta), &data, &content_type) => {
            tracing::debug!("Cached");
            return FileOutcome::done(key, FileAction::Cached, 0);
        }
        Ok(_) => {
            // Never upload over an object whose deletion state is unknown
            if let Err(e) = delete_file(store, &retry, &remote, async_delete).await {
                tracing::warn!(error = %e, "Delete before uploading failed");
                return FileOutcome::failed(key, &e);
            }
            FileAction::Refreshed
        }
    };

    let size = data.len() as u64;
    let uploaded = retry_with_delay(
        &retry,
        || store.put_object(&remote, data.clone(), &content_type),
        always_retry,
    )
    .await;

    match uploaded {
        Ok(()) => {
            tracing::info!(%action, content_type = %content_type, bytes = size, "Synced");
            FileOutcome::done(key, action, size)
        }
        Err(e) => {
            tracing::warn!(%action, error = %e, "Upload failed");
            FileOutcome::failed(key, &e)
        }
    }
}

/// Delete a file; a missing object counts as deleted
async fn delete_file(
    store: &dyn ObjectStore,
    retry: &RetryConfig,
    remote: &str,
    asynchronous: bool,
) -> Result<()> {
    let result = retry_with_delay(
        retry,
        || store.delete_object(remote, asynchronous),
        retry_unless_not_found,
    )
    .await;

    match result {
        Err(e) if e.is_not_found() => {
            tracing::debug!(path = %remote, "File does not exist when deleting");
            Ok(())
        }
        other => other,
    }
}
