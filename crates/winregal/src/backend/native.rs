//! The live Windows registry via `winreg`.

use crate::api::{NativeHandle, RegistryApi};
use crate::error::{RegError, RegResult};
use crate::root::{RootKey, PATH_SEPARATOR};
use crate::value::{ValueRecord, ValueType};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};
use winreg::enums::*;
use winreg::{RegKey, RegValue};

const ERROR_FILE_NOT_FOUND: i32 = 2;
const ERROR_ACCESS_DENIED: i32 = 5;

/// Platform registry. Open keys are kept in a table and released on
/// [`RegistryApi::close_key`] or when the registry is dropped.
#[derive(Default)]
pub struct NativeRegistry {
    keys: Mutex<HashMap<u64, RegKey>>,
    next_handle: AtomicU64,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn predef(root: RootKey) -> RegKey {
        RegKey::predef(match root {
            RootKey::ClassesRoot => HKEY_CLASSES_ROOT,
            RootKey::CurrentUser => HKEY_CURRENT_USER,
            RootKey::LocalMachine => HKEY_LOCAL_MACHINE,
            RootKey::Users => HKEY_USERS,
            RootKey::PerformanceData => HKEY_PERFORMANCE_DATA,
            RootKey::CurrentConfig => HKEY_CURRENT_CONFIG,
            RootKey::DynData => HKEY_DYN_DATA,
        })
    }

    fn with_key<T>(&self, handle: NativeHandle, f: impl FnOnce(&RegKey) -> RegResult<T>) -> RegResult<T> {
        let keys = self.keys.lock();
        let key = keys
            .get(&handle.0)
            .ok_or_else(|| RegError::Backend(format!("invalid handle {}", handle)))?;
        f(key)
    }
}

fn to_record(name: String, value: RegValue) -> ValueRecord {
    let value_type = ValueType(value.vtype.clone() as u32);
    ValueRecord::from_raw(name, value_type, &value.bytes)
}

fn key_error(e: io::Error, path: String) -> RegError {
    match e.raw_os_error() {
        Some(ERROR_FILE_NOT_FOUND) => RegError::key_not_found(path),
        Some(ERROR_ACCESS_DENIED) => RegError::AccessDenied { path },
        _ => RegError::Io(e),
    }
}

impl RegistryApi for NativeRegistry {
    fn open_key(&self, root: RootKey, path: &str) -> RegResult<NativeHandle> {
        let key = Self::predef(root)
            .open_subkey_with_flags(path, KEY_READ)
            .map_err(|e| key_error(e, format!("{}{}{}", root, PATH_SEPARATOR, path)))?;
        let handle = NativeHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.keys.lock().insert(handle.0, key);
        trace!("native: open {}\\{} -> {}", root, path, handle);
        Ok(handle)
    }

    fn close_key(&self, handle: NativeHandle) {
        // Dropping the RegKey closes the OS handle.
        if self.keys.lock().remove(&handle.0).is_none() {
            debug!("native: close of unknown handle {}", handle);
        }
    }

    fn query_value(&self, handle: NativeHandle, name: &str) -> RegResult<ValueRecord> {
        self.with_key(handle, |key| match key.get_raw_value(name) {
            Ok(value) => Ok(to_record(name.to_string(), value)),
            Err(e) if e.raw_os_error() == Some(ERROR_FILE_NOT_FOUND) => {
                Err(RegError::value_not_found(name, handle.to_string()))
            }
            Err(e) => Err(RegError::Io(e)),
        })
    }

    fn enum_key_at(&self, handle: NativeHandle, index: u32) -> RegResult<Option<String>> {
        self.with_key(handle, |key| {
            key.enum_keys()
                .nth(index as usize)
                .transpose()
                .map_err(RegError::Io)
        })
    }

    fn enum_value_at(&self, handle: NativeHandle, index: u32) -> RegResult<Option<ValueRecord>> {
        self.with_key(handle, |key| {
            let entry = key.enum_values().nth(index as usize).transpose()?;
            Ok(entry.map(|(name, value)| to_record(name, value)))
        })
    }
}
