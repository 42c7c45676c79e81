//! Error types for the regf crate.

use thiserror::Error;

/// Hive parsing/reading errors.
#[derive(Debug, Error)]
pub enum RegfError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("read of {length} bytes at {offset:#x} is outside the hive ({size:#x} bytes)")]
    OutOfBounds { offset: u64, length: usize, size: u64 },

    #[error("invalid base block: {0}")]
    InvalidHeader(String),

    #[error("expected {expected} signature at cell {cell_offset:#x}, got {found:#06x}")]
    BadSignature {
        expected: &'static str,
        cell_offset: u32,
        found: u16,
    },

    #[error("cell offset {cell_offset:#x} exceeds hive length {hive_length:#x}")]
    CellOutOfRange { cell_offset: u32, hive_length: u32 },

    #[error("corrupt cell at {cell_offset:#x}: {msg}")]
    Corrupt { cell_offset: u32, msg: String },

    #[error("subkey '{name}' not found under '{parent}'")]
    SubkeyNotFound { name: String, parent: String },

    #[error("value '{name}' not found in key '{key}'")]
    ValueNotFound { name: String, key: String },
}

impl RegfError {
    pub(crate) fn corrupt(cell_offset: u32, msg: impl Into<String>) -> Self {
        RegfError::Corrupt {
            cell_offset,
            msg: msg.into(),
        }
    }

    /// Whether this error means a key or value simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegfError::SubkeyNotFound { .. } | RegfError::ValueNotFound { .. }
        )
    }
}

pub type RegfResult<T> = Result<T, RegfError>;
