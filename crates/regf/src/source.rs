//! Byte sources a hive can be read from.
//!
//! The [`HiveSource`] trait lets the reader work with any backing store:
//! an in-memory buffer, a memory-mapped file, or something custom.

use crate::error::{RegfError, RegfResult};
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Trait for reading raw hive bytes by absolute file offset.
pub trait HiveSource: Send + Sync {
    /// Read `length` bytes starting at `offset`.
    fn read(&self, offset: u64, length: usize) -> RegfResult<Vec<u8>>;

    /// Total number of bytes available.
    fn size(&self) -> u64;
}

fn slice_read(data: &[u8], offset: u64, length: usize) -> RegfResult<Vec<u8>> {
    let size = data.len() as u64;
    let end = offset.checked_add(length as u64);
    match end {
        Some(end) if end <= size => {
            let start = offset as usize;
            Ok(data[start..start + length].to_vec())
        }
        _ => Err(RegfError::OutOfBounds {
            offset,
            length,
            size,
        }),
    }
}

impl HiveSource for [u8] {
    fn read(&self, offset: u64, length: usize) -> RegfResult<Vec<u8>> {
        slice_read(self, offset, length)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

impl HiveSource for Vec<u8> {
    fn read(&self, offset: u64, length: usize) -> RegfResult<Vec<u8>> {
        slice_read(self, offset, length)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

/// A hive file mapped read-only into memory.
pub struct MappedHive {
    path: PathBuf,
    /// None for an empty file (zero-length maps are rejected by the OS).
    mmap: Option<Mmap>,
}

impl MappedHive {
    /// Map a hive file from disk.
    pub fn open(path: impl AsRef<Path>) -> RegfResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();

        let mmap = if size == 0 {
            None
        } else {
            // The map is read-only; concurrent truncation of the file by
            // another process is outside what we can guard against.
            Some(unsafe { MmapOptions::new().map(&file)? })
        };

        Ok(MappedHive { path, mmap })
    }

    /// Path the hive was mapped from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn as_slice(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

impl HiveSource for MappedHive {
    fn read(&self, offset: u64, length: usize) -> RegfResult<Vec<u8>> {
        slice_read(self.as_slice(), offset, length)
    }

    fn size(&self) -> u64 {
        self.as_slice().len() as u64
    }
}
