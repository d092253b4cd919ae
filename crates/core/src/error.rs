//! Error types for upsync-core

/// Result type for upsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the object store and the reconciliation engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The object does not exist remotely. Expected during sync: it selects
    /// the upload path and makes deletes idempotent.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The local tree could not be enumerated any further
    #[error("Walk error: {0}")]
    Walk(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("{0}")]
    General(String),
}

impl Error {
    /// Whether this error reports a missing object
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<walkdir::Error> for Error {
    fn from(e: walkdir::Error) -> Self {
        Error::Walk(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
