//! Concurrent enumeration of the remote tree
//!
//! Every directory is listed by its own task. Tasks report entries over a
//! single channel and finish with a completion event; the aggregator counts
//! listings started but not yet completed and stops when that count drops
//! back to zero.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::RetryConfig;
use crate::path;
use crate::retry::{retry_unless_not_found, retry_with_delay};
use crate::traits::{ListOptions, ObjectStore};

/// Snapshot of the remote tree: canonical key -> depth
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteTree {
    pub files: HashMap<String, usize>,
    pub directories: HashMap<String, usize>,
}

enum ListEvent {
    Entry { key: String, is_dir: bool },
    Done,
}

/// Sends the completion event when a listing task ends, even by panic
struct DoneGuard(mpsc::UnboundedSender<ListEvent>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.0.send(ListEvent::Done);
    }
}

/// Lists a whole remote subtree
pub struct TreeLister {
    store: Arc<dyn ObjectStore>,
    retry: RetryConfig,
    page_size: i32,
}

impl TreeLister {
    pub fn new(store: Arc<dyn ObjectStore>, retry: RetryConfig, page_size: i32) -> Self {
        Self {
            store,
            retry,
            page_size,
        }
    }

    /// List every file and directory below `root`
    ///
    /// The root itself is recorded as a directory. A directory whose listing
    /// fails is logged and contributes no children.
    pub async fn list_all(&self, root: &str) -> RemoteTree {
        let root = path::normalize(root);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tasks = JoinSet::new();
        let mut tree = RemoteTree::default();

        tree.directories.insert(root.clone(), path::depth(&root));
        self.spawn_listing(&mut tasks, root, tx.clone());
        let mut outstanding: usize = 1;

        while outstanding > 0 {
            let Some(event) = rx.recv().await else {
                break;
            };

            match event {
                ListEvent::Entry { key, is_dir: false } => {
                    let depth = path::depth(&key);
                    tree.files.insert(key, depth);
                }
                ListEvent::Entry { key, is_dir: true } => {
                    let depth = path::depth(&key);
                    if tree.directories.insert(key.clone(), depth).is_none() {
                        self.spawn_listing(&mut tasks, key, tx.clone());
                        outstanding += 1;
                    }
                }
                ListEvent::Done => outstanding -= 1,
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Listing task did not complete");
            }
        }

        tracing::debug!(
            files = tree.files.len(),
            directories = tree.directories.len(),
            "Listed remote tree"
        );
        tree
    }

    fn spawn_listing(
        &self,
        tasks: &mut JoinSet<()>,
        dir: String,
        tx: mpsc::UnboundedSender<ListEvent>,
    ) {
        let store = Arc::clone(&self.store);
        let retry = self.retry;
        let page_size = self.page_size;

        tasks.spawn(async move {
            let done = DoneGuard(tx);
            list_directory(store.as_ref(), &retry, page_size, &dir, &done.0).await;
        });
    }
}

/// Page through one directory, emitting each child
async fn list_directory(
    store: &dyn ObjectStore,
    retry: &RetryConfig,
    page_size: i32,
    dir: &str,
    tx: &mpsc::UnboundedSender<ListEvent>,
) {
    let remote = path::to_remote(dir);
    let mut continuation_token: Option<String> = None;

    loop {
        let options = ListOptions {
            max_keys: Some(page_size),
            continuation_token: continuation_token.clone(),
        };

        let page = match retry_with_delay(
            retry,
            || store.list_dir(&remote, options.clone()),
            retry_unless_not_found,
        )
        .await
        {
            Ok(page) => page,
            Err(e) if e.is_not_found() => {
                tracing::debug!(path = %remote, "Directory does not exist");
                return;
            }
            Err(e) => {
                tracing::warn!(path = %remote, error = %e, "List directory failed");
                return;
            }
        };

        for item in page.items {
            let key = path::join(dir, &item.name);
            if key == dir {
                continue;
            }
            let _ = tx.send(ListEvent::Entry {
                key,
                is_dir: item.is_dir,
            });
        }

        match page.continuation_token {
            Some(token) if page.truncated => continuation_token = Some(token),
            _ => return,
        }
    }
}
