//! Remote path normalization
//!
//! Keys are kept in canonical form: `/`-separated, without leading or
//! trailing slashes. The bucket root is the literal [`ROOT`].

/// The bucket root
pub const ROOT: &str = "/";

/// Normalize a remote path into a canonical key
///
/// Empty input and any run of slashes normalize to [`ROOT`].
pub fn normalize(path: &str) -> String {
    let key = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/");

    if key.is_empty() {
        ROOT.to_string()
    } else {
        key
    }
}

/// Whether a key denotes the bucket root
pub fn is_root(key: &str) -> bool {
    normalize(key) == ROOT
}

/// Number of path segments in a key. The root has depth 1.
pub fn depth(key: &str) -> usize {
    let key = normalize(key);
    if key == ROOT {
        return 1;
    }
    key.split('/').count()
}

/// Join a child name onto a parent key
///
/// If the name already carries the parent as a prefix (some backends list
/// full keys), the prefix is stripped first so both forms collapse to the
/// same key.
pub fn join(parent: &str, name: &str) -> String {
    let parent = normalize(parent);
    let name = normalize(name);

    if parent == ROOT {
        return name;
    }
    if name == ROOT {
        return parent;
    }

    let name = name
        .strip_prefix(&parent)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(name.as_str());

    format!("{parent}/{name}")
}

/// Slash-rooted form of a key, as passed to the object store
pub fn to_remote(key: &str) -> String {
    let key = normalize(key);
    if key == ROOT {
        key
    } else {
        format!("/{key}")
    }
}

/// Re-root a local relative path under the publish prefix
///
/// Unlike [`join`], a relative path is never treated as already prefixed.
pub fn target_key(publish_dir: &str, relative: &str) -> String {
    let prefix = normalize(publish_dir);
    let relative = normalize(relative);
    match (prefix == ROOT, relative == ROOT) {
        (true, _) => relative,
        (false, true) => prefix,
        (false, false) => format!("{prefix}/{relative}"),
    }
}

/// Every directory prefix of a file key, shallowest first
///
/// `a/b/c.txt` yields `a` and `a/b`. A file directly under the root has no
/// ancestors.
pub fn ancestors(key: &str) -> Vec<String> {
    let key = normalize(key);
    if key == ROOT {
        return Vec::new();
    }

    let segments: Vec<&str> = key.split('/').collect();
    (1..segments.len())
        .map(|n| segments[..n].join("/"))
        .collect()
}
