//! ObjectStore trait and the value types it exchanges
//!
//! The reconciliation engine only talks to remote storage through this
//! trait, so it can run against any backend (or an in-memory fake in tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A child entry returned by a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Entry name, relative to the listed directory. Backends may also
    /// return the name prefixed with the listed path.
    pub name: String,

    /// Whether the entry is a directory
    pub is_dir: bool,
}

impl ObjectInfo {
    /// Create a file entry
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    /// Create a directory entry
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }
}

/// Metadata recorded remotely for a single file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub path: String,
    pub content_type: String,
    /// Hex MD5 digest of the stored bytes
    pub content_hash: String,
}

/// Options for a paginated directory listing
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Maximum number of entries per page
    pub max_keys: Option<i32>,

    /// Token returned by the previous page
    pub continuation_token: Option<String>,
}

/// One page of a directory listing
#[derive(Debug, Clone, Default)]
pub struct ListResult {
    pub items: Vec<ObjectInfo>,
    pub truncated: bool,
    pub continuation_token: Option<String>,
}

/// Remote storage capability required by the sync engine
///
/// All paths are slash-rooted (`/dir/file.txt`).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List the immediate children of a directory, one page at a time
    async fn list_dir(&self, path: &str, options: ListOptions) -> Result<ListResult>;

    /// Fetch metadata for a file, or `Error::NotFound`
    async fn head_object(&self, path: &str) -> Result<ObjectMeta>;

    /// Store `data` at `path` with the given content type
    async fn put_object(&self, path: &str, data: Vec<u8>, content_type: &str) -> Result<()>;

    /// Delete a file. `asynchronous` lets backends that support it return
    /// before the deletion is fully applied.
    async fn delete_object(&self, path: &str, asynchronous: bool) -> Result<()>;

    /// Remove an (empty) directory
    async fn remove_dir(&self, path: &str) -> Result<()>;

    /// Invalidate CDN caches for `paths`, returning the paths that failed
    async fn purge(&self, paths: &[String]) -> Result<Vec<String>>;
}
