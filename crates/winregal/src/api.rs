//! The boundary to the underlying registry store.
//!
//! [`RegistryApi`] is the handful of primitives the key layer needs from a
//! registry implementation: open, close, query, and index-based enumeration.
//! Backends live in [`crate::backend`].

use crate::error::RegResult;
use crate::root::RootKey;
use crate::value::ValueRecord;
use std::fmt;

/// Opaque reference to an open key. Only the issuing backend interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub u64);

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Primitive operations of a hierarchical registry store.
///
/// Enumeration is index-based: `enum_key_at` / `enum_value_at` return
/// `Ok(None)` once `index` is past the last entry. Any other failure is a
/// real error.
pub trait RegistryApi: Send + Sync {
    /// Open the key at `path` (relative, `\`-separated) under `root`.
    fn open_key(&self, root: RootKey, path: &str) -> RegResult<NativeHandle>;

    /// Release a handle. Unknown or already released handles are ignored.
    fn close_key(&self, handle: NativeHandle);

    /// Look up a named value under an open key.
    fn query_value(&self, handle: NativeHandle, name: &str) -> RegResult<ValueRecord>;

    /// Name of the `index`-th subkey, or `None` past the end.
    fn enum_key_at(&self, handle: NativeHandle, index: u32) -> RegResult<Option<String>>;

    /// The `index`-th value, or `None` past the end.
    fn enum_value_at(&self, handle: NativeHandle, index: u32) -> RegResult<Option<ValueRecord>>;
}
