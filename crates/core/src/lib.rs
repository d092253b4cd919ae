//! upsync-core: Reconciliation engine for the upsync deploy tool
//!
//! This crate mirrors a local directory tree into a remote object store:
//! - Concurrent listing of the remote tree
//! - Local tree walking with hidden-entry filtering
//! - Content-type and MD5 based cache decisions
//! - Per-file upload/refresh/skip with bounded retry
//! - Orphan file deletion and depth-ordered directory pruning
//!
//! The engine only depends on the [`ObjectStore`] trait, so it is
//! independent of any specific storage SDK.

pub mod cache;
pub mod config;
pub mod error;
pub mod lister;
pub mod path;
pub mod prune;
pub mod reconcile;
pub mod retry;
pub mod traits;
pub mod walker;

pub use config::{Config, ConfigManager, RetryConfig, StoreConfig, SyncConfig};
pub use error::{Error, Result};
pub use lister::{RemoteTree, TreeLister};
pub use prune::{DirectoryPruner, PruneReport};
pub use reconcile::{
    FileAction, FileOutcome, ProgressFn, ReconciliationPlan, Reconciler, SyncReport,
};
pub use retry::{always_retry, retry_unless_not_found, retry_with_delay};
pub use traits::{ListOptions, ListResult, ObjectInfo, ObjectMeta, ObjectStore};
pub use walker::{LocalFile, LocalWalker};
