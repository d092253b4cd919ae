//! In-memory object store for driving the reconciler in tests
//!
//! Directories are explicit, as in stores with a real directory model:
//! uploading a file creates its parents, and removing a non-empty directory
//! fails.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use upsync_core::cache::content_md5;
use upsync_core::path::{self, ROOT};
use upsync_core::{
    Error, ListOptions, ListResult, ObjectInfo, ObjectMeta, ObjectStore, Result, RetryConfig,
    SyncConfig,
};

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Head,
    Put,
    Delete,
    RemoveDir,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(String),
    Head(String),
    Put(String),
    Delete(String),
    RemoveDir(String),
    Purge(Vec<String>),
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
}

#[derive(Default)]
struct State {
    files: BTreeMap<String, StoredObject>,
    dirs: BTreeSet<String>,
    calls: Vec<Call>,
    failures: HashMap<(Op, String), u32>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn parent_of(key: &str) -> String {
    match key.rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => ROOT.to_string(),
    }
}

fn name_of(key: &str) -> &str {
    key.rsplit_once('/').map(|(_, name)| name).unwrap_or(key)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file (and its parent directories) without recording a call
    pub fn insert(&self, key: &str, data: &[u8], content_type: &str) {
        let mut state = self.state.lock().unwrap();
        let key = path::normalize(key);
        for dir in path::ancestors(&key) {
            state.dirs.insert(dir);
        }
        state.files.insert(
            key,
            StoredObject {
                data: data.to_vec(),
                content_type: content_type.to_string(),
            },
        );
    }

    /// Seed an empty directory
    pub fn insert_dir(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        let key = path::normalize(key);
        for dir in path::ancestors(&key) {
            state.dirs.insert(dir);
        }
        state.dirs.insert(key);
    }

    /// Make the next `times` calls of `op` on `path` fail with a network error
    pub fn fail(&self, op: Op, path: &str, times: u32) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((op, path.to_string()), times);
    }

    pub fn file(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&path::normalize(key))
            .map(|o| (o.data.clone(), o.content_type.clone()))
    }

    pub fn has_dir(&self, key: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .dirs
            .contains(&path::normalize(key))
    }

    pub fn file_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().files.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Calls that write to the store
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| {
                matches!(
                    c,
                    Call::Put(_) | Call::Delete(_) | Call::RemoveDir(_)
                )
            })
            .collect()
    }

    pub fn purges(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Purge(paths) => Some(paths),
                _ => None,
            })
            .collect()
    }

    fn begin(&self, op: Op, path: &str, call: Call) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if let Some(remaining) = state.failures.get_mut(&(op, path.to_string()))
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(Error::Network(format!("injected failure for {path}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_dir(&self, path: &str, options: ListOptions) -> Result<ListResult> {
        self.begin(Op::List, path, Call::List(path.to_string()))?;
        let state = self.state.lock().unwrap();
        let dir = path::normalize(path);

        if dir != ROOT && !state.dirs.contains(&dir) {
            return Err(Error::NotFound(path.to_string()));
        }

        let mut children: Vec<ObjectInfo> = state
            .dirs
            .iter()
            .filter(|d| parent_of(d) == dir)
            .map(|d| ObjectInfo::dir(name_of(d)))
            .collect();
        children.extend(
            state
                .files
                .keys()
                .filter(|f| parent_of(f) == dir)
                .map(|f| ObjectInfo::file(name_of(f))),
        );

        let start: usize = options
            .continuation_token
            .as_deref()
            .map(|t| t.parse().unwrap())
            .unwrap_or(0);
        let limit = options.max_keys.unwrap_or(1000).max(1) as usize;
        let end = (start + limit).min(children.len());
        let truncated = end < children.len();

        Ok(ListResult {
            items: children[start..end].to_vec(),
            truncated,
            continuation_token: truncated.then(|| end.to_string()),
        })
    }

    async fn head_object(&self, path: &str) -> Result<ObjectMeta> {
        self.begin(Op::Head, path, Call::Head(path.to_string()))?;
        let state = self.state.lock().unwrap();
        state
            .files
            .get(&path::normalize(path))
            .map(|o| ObjectMeta {
                path: path.to_string(),
                content_type: o.content_type.clone(),
                content_hash: content_md5(&o.data),
            })
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn put_object(&self, path: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.begin(Op::Put, path, Call::Put(path.to_string()))?;
        let mut state = self.state.lock().unwrap();
        let key = path::normalize(path);
        for dir in path::ancestors(&key) {
            state.dirs.insert(dir);
        }
        state.files.insert(
            key,
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn delete_object(&self, path: &str, _asynchronous: bool) -> Result<()> {
        self.begin(Op::Delete, path, Call::Delete(path.to_string()))?;
        let mut state = self.state.lock().unwrap();
        state
            .files
            .remove(&path::normalize(path))
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        self.begin(Op::RemoveDir, path, Call::RemoveDir(path.to_string()))?;
        let mut state = self.state.lock().unwrap();
        let dir = path::normalize(path);

        if !state.dirs.contains(&dir) {
            return Err(Error::NotFound(path.to_string()));
        }
        let has_children = state.dirs.iter().any(|d| parent_of(d) == dir)
            || state.files.keys().any(|f| parent_of(f) == dir);
        if has_children {
            return Err(Error::General(format!("directory not empty: {path}")));
        }

        state.dirs.remove(&dir);
        Ok(())
    }

    async fn purge(&self, paths: &[String]) -> Result<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::Purge(paths.to_vec()));
        Ok(Vec::new())
    }
}

/// Write `files` (relative path, contents) below `root`
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (relative, contents) in files {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
}

/// Sync config with a fast retry delay
pub fn test_config(local_dir: &Path, publish_dir: &str) -> SyncConfig {
    let mut config = SyncConfig::new(local_dir, publish_dir);
    config.retry = RetryConfig {
        max_attempts: 3,
        delay_ms: 1,
    };
    config
}
