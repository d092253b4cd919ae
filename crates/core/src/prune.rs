//! Bottom-up removal of orphan directories
//!
//! Directories are removed one depth tier at a time, deepest first, so a
//! directory is never targeted while an orphan subdirectory still exists
//! below it. Removals within a tier run concurrently.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::future::join_all;

use crate::config::RetryConfig;
use crate::path;
use crate::retry::{retry_unless_not_found, retry_with_delay};
use crate::traits::ObjectStore;

/// Outcome of a prune pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Group directories into removal tiers, deepest first
///
/// The root is never part of a tier. Paths within a tier are sorted.
pub fn deletion_tiers(dirs: &HashMap<String, usize>) -> Vec<Vec<String>> {
    let mut by_depth: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for (dir, depth) in dirs {
        if path::is_root(dir) {
            continue;
        }
        by_depth.entry(*depth).or_default().push(dir.clone());
    }

    by_depth
        .into_values()
        .rev()
        .map(|mut tier| {
            tier.sort();
            tier
        })
        .collect()
}

pub struct DirectoryPruner {
    store: Arc<dyn ObjectStore>,
    retry: RetryConfig,
}

impl DirectoryPruner {
    pub fn new(store: Arc<dyn ObjectStore>, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    /// Remove every directory in `dirs`, deepest tier first
    pub async fn prune(&self, dirs: &HashMap<String, usize>) -> PruneReport {
        let mut report = PruneReport::default();

        for tier in deletion_tiers(dirs) {
            let results = join_all(tier.into_iter().map(|dir| async move {
                let removed = self.remove(&dir).await;
                (dir, removed)
            }))
            .await;

            for (dir, removed) in results {
                if removed {
                    report.deleted.push(dir);
                } else {
                    report.failed.push(dir);
                }
            }
        }

        report
    }

    async fn remove(&self, dir: &str) -> bool {
        let remote = path::to_remote(dir);
        let result = retry_with_delay(
            &self.retry,
            || self.store.remove_dir(&remote),
            retry_unless_not_found,
        )
        .await;

        match result {
            Ok(()) => {
                tracing::info!(path = %remote, "Deleted directory");
                true
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(path = %remote, "Directory already gone");
                true
            }
            Err(e) => {
                tracing::warn!(path = %remote, error = %e, "Delete directory failed");
                false
            }
        }
    }
}
