//! Fatal errors that stop a run before any item is processed.
//!
//! Per-item problems never surface here: provider failures fall through the
//! chain and filesystem failures are captured in each `MoveRecord`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SorterError {
    #[error("source directory does not exist: {0}")]
    SourceMissing(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("{0} is not configured")]
    MissingSetting(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("category already exists: {0}")]
    DuplicateCategory(String),

    #[error("category not found: {0}")]
    CategoryNotFound(String),

    #[error("keychain error for {account}: {source}")]
    Keychain {
        account: String,
        #[source]
        source: keyring::Error,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SorterError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn keychain(account: impl Into<String>, source: keyring::Error) -> Self {
        Self::Keychain {
            account: account.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SorterError>;
