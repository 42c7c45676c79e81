//! Error types for registry operations.
//!
//! Every failure is a [`RegError`], the single "registry operation failed"
//! kind. Variants distinguish the conditions callers branch on.

use thiserror::Error;

/// Errors that can occur while navigating the registry.
#[derive(Error, Debug)]
pub enum RegError {
    /// A path or explicit identifier does not name a known root.
    #[error("unknown root key: {0}")]
    UnknownRoot(String),

    /// A read or derive operation was attempted on a closed key.
    #[error("key '{key}' is not open")]
    KeyNotOpen { key: String },

    /// The named value does not exist under the key.
    #[error("value '{name}' not found in key '{key}'")]
    ValueNotFound { name: String, key: String },

    /// The key path does not exist.
    #[error("key '{path}' not found")]
    KeyNotFound { path: String },

    /// The backend refused access to the key.
    #[error("access denied to key '{path}'")]
    AccessDenied { path: String },

    /// Platform registry failure, with the original OS diagnostic.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Offline hive failure.
    #[error("hive error: {0}")]
    Hive(#[from] regf::RegfError),

    /// Any other backend failure.
    #[error("registry backend error: {0}")]
    Backend(String),
}

impl RegError {
    /// Create a KeyNotOpen error.
    pub fn key_not_open(key: impl Into<String>) -> Self {
        RegError::KeyNotOpen { key: key.into() }
    }

    /// Create a ValueNotFound error.
    pub fn value_not_found(name: impl Into<String>, key: impl Into<String>) -> Self {
        RegError::ValueNotFound {
            name: name.into(),
            key: key.into(),
        }
    }

    /// Create a KeyNotFound error.
    pub fn key_not_found(path: impl Into<String>) -> Self {
        RegError::KeyNotFound { path: path.into() }
    }

    /// Whether this error means the target simply does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            RegError::ValueNotFound { .. } | RegError::KeyNotFound { .. } => true,
            RegError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            RegError::Hive(e) => e.is_not_found(),
            _ => false,
        }
    }
}

/// Result type for registry operations.
pub type RegResult<T> = Result<T, RegError>;
