//! Local tree enumeration
//!
//! Walks the local source directory and yields every non-hidden file with
//! its path relative to the root. Hidden entries (names starting with `.`)
//! are skipped, and hidden directories are not descended into.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::{Error, Result};

/// Leading marker of hidden entries
const HIDDEN_MARKER: char = '.';

/// A file discovered in the local tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub absolute_path: PathBuf,
    /// `/`-separated path below the walk root
    pub relative_path: String,
}

impl LocalFile {
    /// Read the file's bytes
    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(&self.absolute_path).await?)
    }
}

/// Lazy, single-use walk over a local tree
///
/// The first walk error is yielded once and ends the iteration.
pub struct LocalWalker {
    root: PathBuf,
    inner: walkdir::FilterEntry<walkdir::IntoIter, fn(&DirEntry) -> bool>,
    failed: bool,
}

impl LocalWalker {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let inner = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(is_visible as fn(&DirEntry) -> bool);

        Self {
            root,
            inner,
            failed: false,
        }
    }

    fn to_local_file(&self, entry: &DirEntry) -> Result<Option<LocalFile>> {
        if entry.file_type().is_dir() {
            return Ok(None);
        }

        let relative = entry
            .path()
            .strip_prefix(&self.root)
            .map_err(|_| Error::InvalidPath(entry.path().display().to_string()))?;

        let relative_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if relative_path.is_empty() || relative_path.starts_with(HIDDEN_MARKER) {
            tracing::debug!(path = %relative_path, "Skipped hidden entry");
            return Ok(None);
        }

        Ok(Some(LocalFile {
            absolute_path: entry.path().to_path_buf(),
            relative_path,
        }))
    }
}

/// Entries below the root whose name starts with the hidden marker are
/// filtered out, along with their whole subtree.
fn is_visible(entry: &DirEntry) -> bool {
    entry.depth() == 0
        || !entry
            .file_name()
            .to_string_lossy()
            .starts_with(HIDDEN_MARKER)
}

impl Iterator for LocalWalker {
    type Item = Result<LocalFile>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            match self.inner.next()? {
                Ok(entry) => match self.to_local_file(&entry) {
                    Ok(Some(file)) => return Some(Ok(file)),
                    Ok(None) => continue,
                    Err(e) => {
                        self.failed = true;
                        return Some(Err(e));
                    }
                },
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}
