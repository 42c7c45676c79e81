//! In-process registry tree.
//!
//! Keys and values live in a mutex-guarded tree per root. Lookups ignore
//! ASCII case like the platform registry does; enumeration follows insertion
//! order. Handles are counted so callers can check that nothing leaks.

use crate::api::{NativeHandle, RegistryApi};
use crate::error::{RegError, RegResult};
use crate::root::{RootKey, PATH_SEPARATOR};
use crate::value::{ValueData, ValueRecord, ValueType};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct Node {
    name: String,
    values: Vec<ValueRecord>,
    children: Vec<Node>,
    denied: bool,
}

impl Node {
    fn child(&self, name: &str) -> Option<&Node> {
        self.children
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn child_mut_or_insert(&mut self, name: &str) -> &mut Node {
        let pos = match self
            .children
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
        {
            Some(pos) => pos,
            None => {
                self.children.push(Node {
                    name: name.to_string(),
                    ..Node::default()
                });
                self.children.len() - 1
            }
        };
        &mut self.children[pos]
    }
}

#[derive(Debug)]
struct OpenEntry {
    root: RootKey,
    path: String,
}

#[derive(Debug, Default)]
struct State {
    roots: HashMap<RootKey, Node>,
    handles: HashMap<u64, OpenEntry>,
    next_handle: u64,
    fail_next_enum: Option<String>,
}

impl State {
    fn lookup(&self, root: RootKey, path: &str) -> Option<&Node> {
        let mut node = self.roots.get(&root)?;
        for component in components(path) {
            node = node.child(component)?;
        }
        Some(node)
    }

    fn lookup_mut(&mut self, root: RootKey, path: &str) -> &mut Node {
        let mut node = self.roots.entry(root).or_default();
        for component in components(path) {
            node = node.child_mut_or_insert(component);
        }
        node
    }

    fn resolve(&self, handle: NativeHandle) -> RegResult<&Node> {
        let entry = self
            .handles
            .get(&handle.0)
            .ok_or_else(|| RegError::Backend(format!("invalid handle {}", handle)))?;
        self.lookup(entry.root, &entry.path)
            .ok_or_else(|| RegError::key_not_found(full_path(entry.root, &entry.path)))
    }

    fn take_failure(&mut self) -> RegResult<()> {
        match self.fail_next_enum.take() {
            Some(msg) => Err(RegError::Backend(msg)),
            None => Ok(()),
        }
    }
}

fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split(PATH_SEPARATOR).filter(|c| !c.is_empty())
}

fn full_path(root: RootKey, path: &str) -> String {
    if path.is_empty() {
        root.name().to_string()
    } else {
        format!("{}{}{}", root.name(), PATH_SEPARATOR, path)
    }
}

/// A registry held entirely in memory.
///
/// Every root exists and starts out empty.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: Mutex<State>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the key at `path` and any missing parents.
    pub fn create_key(&self, root: RootKey, path: &str) {
        self.state.lock().lookup_mut(root, path);
    }

    /// Set (or replace) a value, creating the key as needed.
    pub fn set_value(
        &self,
        root: RootKey,
        path: &str,
        name: &str,
        data: impl Into<ValueData>,
        value_type: ValueType,
    ) {
        let record = ValueRecord::new(name, data, value_type);
        let mut state = self.state.lock();
        let node = state.lookup_mut(root, path);
        match node
            .values
            .iter_mut()
            .find(|v| v.name.eq_ignore_ascii_case(name))
        {
            Some(existing) => *existing = record,
            None => node.values.push(record),
        }
    }

    /// Make opening the key at `path` fail with [`RegError::AccessDenied`].
    /// The key is created if missing.
    pub fn deny(&self, root: RootKey, path: &str) {
        self.state.lock().lookup_mut(root, path).denied = true;
    }

    /// Make the next subkey or value enumeration call fail.
    pub fn fail_next_enum(&self, msg: impl Into<String>) {
        self.state.lock().fail_next_enum = Some(msg.into());
    }

    /// Number of handles opened and not yet closed.
    pub fn open_handle_count(&self) -> usize {
        self.state.lock().handles.len()
    }
}

impl RegistryApi for MemoryRegistry {
    fn open_key(&self, root: RootKey, path: &str) -> RegResult<NativeHandle> {
        let mut state = self.state.lock();
        match state.lookup(root, path) {
            None if path.is_empty() => {}
            None => return Err(RegError::key_not_found(full_path(root, path))),
            Some(node) if node.denied => {
                return Err(RegError::AccessDenied {
                    path: full_path(root, path),
                })
            }
            Some(_) => {}
        }
        state.next_handle += 1;
        let handle = NativeHandle(state.next_handle);
        state.handles.insert(
            handle.0,
            OpenEntry {
                root,
                path: path.to_string(),
            },
        );
        trace!("memory: open {} -> {}", full_path(root, path), handle);
        Ok(handle)
    }

    fn close_key(&self, handle: NativeHandle) {
        if self.state.lock().handles.remove(&handle.0).is_none() {
            debug!("memory: close of unknown handle {}", handle);
        }
    }

    fn query_value(&self, handle: NativeHandle, name: &str) -> RegResult<ValueRecord> {
        let state = self.state.lock();
        let entry_path = match state.handles.get(&handle.0) {
            Some(entry) => full_path(entry.root, &entry.path),
            None => return Err(RegError::Backend(format!("invalid handle {}", handle))),
        };
        let node = match state.resolve(handle) {
            Ok(node) => node,
            // Empty roots have no node until something is written under them.
            Err(RegError::KeyNotFound { .. }) => {
                return Err(RegError::value_not_found(name, entry_path))
            }
            Err(e) => return Err(e),
        };
        node.values
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| RegError::value_not_found(name, entry_path))
    }

    fn enum_key_at(&self, handle: NativeHandle, index: u32) -> RegResult<Option<String>> {
        let mut state = self.state.lock();
        state.take_failure()?;
        match state.resolve(handle) {
            Ok(node) => Ok(node.children.get(index as usize).map(|c| c.name.clone())),
            Err(RegError::KeyNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn enum_value_at(&self, handle: NativeHandle, index: u32) -> RegResult<Option<ValueRecord>> {
        let mut state = self.state.lock();
        state.take_failure()?;
        match state.resolve(handle) {
            Ok(node) => Ok(node.values.get(index as usize).cloned()),
            Err(RegError::KeyNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
