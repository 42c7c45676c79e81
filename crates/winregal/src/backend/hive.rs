//! Registry backed by offline hive files.
//!
//! Each [`regf::Hive`] is mounted at a root and a path below it, e.g. a
//! `SOFTWARE` hive at `HKEY_LOCAL_MACHINE\SOFTWARE`. A key path resolves to
//! the mount with the longest matching prefix; the rest of the path is
//! walked inside that hive. Paths above a mount point are not synthesized.
//!
//! A handle encodes the mount index and the key's cell offset, so it carries
//! no state and closing it is free.

use crate::api::{NativeHandle, RegistryApi};
use crate::error::{RegError, RegResult};
use crate::root::{normalize_path, RootKey, PATH_SEPARATOR};
use crate::value::{ValueRecord, ValueType};
use regf::{Hive, KeyNode, KeyValue, RegfError};
use std::path::Path;
use tracing::{debug, info, trace};

struct Mount {
    root: RootKey,
    /// Normalized mount point relative to `root`.
    path: String,
    hive: Hive,
}

/// Registry view over one or more mounted hive files.
#[derive(Default)]
pub struct HiveRegistry {
    mounts: Vec<Mount>,
}

impl HiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a parsed hive at `path` under `root`.
    pub fn mount(&mut self, root: RootKey, path: &str, hive: Hive) {
        let path = normalize_path(path);
        info!(
            "mounting hive '{}' at {}{}{}",
            hive.header().hive_name,
            root,
            PATH_SEPARATOR,
            path
        );
        self.mounts.push(Mount { root, path, hive });
    }

    /// Map a hive file from disk and mount it.
    pub fn mount_file(&mut self, root: RootKey, path: &str, file: impl AsRef<Path>) -> RegResult<()> {
        let hive = Hive::open(file)?;
        self.mount(root, path, hive);
        Ok(())
    }

    pub fn mount_count(&self) -> usize {
        self.mounts.len()
    }

    /// The mount owning `path` and the remaining path inside its hive.
    fn locate(&self, root: RootKey, path: &str) -> Option<(usize, String)> {
        self.mounts
            .iter()
            .enumerate()
            .filter(|(_, m)| m.root == root)
            .filter_map(|(idx, m)| strip_prefix(&m.path, path).map(|rest| (idx, m.path.len(), rest)))
            .max_by_key(|(_, depth, _)| *depth)
            .map(|(idx, _, rest)| (idx, rest))
    }

    fn resolve(&self, handle: NativeHandle) -> RegResult<(&Mount, KeyNode)> {
        let (idx, cell) = split_handle(handle);
        let mount = self
            .mounts
            .get(idx)
            .ok_or_else(|| RegError::Backend(format!("invalid handle {}", handle)))?;
        let node = mount.hive.reader().read_key_node(cell)?;
        Ok((mount, node))
    }
}

/// `path` relative to `prefix`, if `prefix` is a component-wise,
/// case-insensitive prefix of it.
fn strip_prefix(prefix: &str, path: &str) -> Option<String> {
    let mut rest = path.split(PATH_SEPARATOR).filter(|c| !c.is_empty());
    for component in prefix.split(PATH_SEPARATOR).filter(|c| !c.is_empty()) {
        if !rest.next()?.eq_ignore_ascii_case(component) {
            return None;
        }
    }
    Some(rest.collect::<Vec<_>>().join("\\"))
}

fn make_handle(mount: usize, cell: u32) -> NativeHandle {
    NativeHandle(((mount as u64 + 1) << 32) | cell as u64)
}

fn split_handle(handle: NativeHandle) -> (usize, u32) {
    (((handle.0 >> 32) as usize).wrapping_sub(1), handle.0 as u32)
}

fn to_record(value: KeyValue) -> ValueRecord {
    ValueRecord::from_raw(value.name, ValueType(value.value_type), &value.data)
}

impl RegistryApi for HiveRegistry {
    fn open_key(&self, root: RootKey, path: &str) -> RegResult<NativeHandle> {
        let full = if path.is_empty() {
            root.name().to_string()
        } else {
            format!("{}{}{}", root, PATH_SEPARATOR, path)
        };
        let (idx, rest) = self
            .locate(root, path)
            .ok_or_else(|| RegError::key_not_found(&full))?;
        let node = match self.mounts[idx].hive.reader().open_key(&rest) {
            Ok(node) => node,
            Err(e) if e.is_not_found() => return Err(RegError::key_not_found(full)),
            Err(e) => return Err(e.into()),
        };
        let handle = make_handle(idx, node.cell_offset);
        trace!("hive: open {} -> {}", full, handle);
        Ok(handle)
    }

    fn close_key(&self, handle: NativeHandle) {
        trace!("hive: close {}", handle);
    }

    fn query_value(&self, handle: NativeHandle, name: &str) -> RegResult<ValueRecord> {
        let (mount, node) = self.resolve(handle)?;
        match mount.hive.reader().get_value(&node, name) {
            Ok(value) => Ok(to_record(value)),
            Err(RegfError::ValueNotFound { key, .. }) => Err(RegError::value_not_found(name, key)),
            Err(e) => Err(e.into()),
        }
    }

    fn enum_key_at(&self, handle: NativeHandle, index: u32) -> RegResult<Option<String>> {
        let (mount, node) = self.resolve(handle)?;
        let child = mount.hive.reader().subkey_at(&node, index as usize)?;
        if child.is_none() {
            debug!("hive: '{}' has {} subkeys", node.name, index);
        }
        Ok(child.map(|c| c.name))
    }

    fn enum_value_at(&self, handle: NativeHandle, index: u32) -> RegResult<Option<ValueRecord>> {
        let (mount, node) = self.resolve(handle)?;
        Ok(mount
            .hive
            .reader()
            .value_at(&node, index as usize)?
            .map(to_record))
    }
}
