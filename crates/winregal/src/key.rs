//! KeyHandle: one addressable key in the registry hierarchy.
//!
//! A handle is built from a path, opened to acquire a native handle from the
//! backend, used for lookups and enumeration, and closed again. Every read
//! operation requires the handle to be open and fails with
//! [`RegError::KeyNotOpen`] otherwise.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut run = KeyHandle::new(&registry, r"HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\Windows\CurrentVersion\Run")?;
//! let key = run.scoped()?;
//! for value in key.values()? {
//!     println!("{}", value?);
//! }
//! // closed when `key` goes out of scope
//! ```

use crate::api::{NativeHandle, RegistryApi};
use crate::error::{RegError, RegResult};
use crate::root::{join_path, leaf_name, parse_path, RootKey, PATH_SEPARATOR};
use crate::value::ValueRecord;
use std::fmt;
use std::ops::{Deref, DerefMut};
use tracing::{debug, trace};

/// A registry key addressed by root and relative path.
pub struct KeyHandle<'a> {
    pub(crate) api: &'a dyn RegistryApi,
    pub(crate) root: RootKey,
    pub(crate) root_name: &'static str,
    pub(crate) path: String,
    /// Default traversal mode, inherited by derived children.
    pub(crate) recursive: bool,
    /// Present only between a successful open and the matching close.
    pub(crate) native: Option<NativeHandle>,
}

/// Either a value or a subkey found under a key.
#[derive(Debug)]
pub enum RegItem<'a> {
    Value(ValueRecord),
    /// An unopened handle to the subkey.
    Key(KeyHandle<'a>),
}

impl<'a> RegItem<'a> {
    pub fn as_value(&self) -> Option<&ValueRecord> {
        match self {
            RegItem::Value(v) => Some(v),
            RegItem::Key(_) => None,
        }
    }

    pub fn as_key(&self) -> Option<&KeyHandle<'a>> {
        match self {
            RegItem::Key(k) => Some(k),
            RegItem::Value(_) => None,
        }
    }

    pub fn into_key(self) -> Option<KeyHandle<'a>> {
        match self {
            RegItem::Key(k) => Some(k),
            RegItem::Value(_) => None,
        }
    }
}

impl fmt::Display for RegItem<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegItem::Value(v) => write!(f, "{}", v),
            RegItem::Key(k) => write!(f, "{}", k),
        }
    }
}

impl<'a> KeyHandle<'a> {
    /// Address a key by a root-qualified path such as
    /// `HKEY_CURRENT_USER\Software\Vendor`. The root name is matched
    /// case-insensitively.
    pub fn new(api: &'a dyn RegistryApi, path: &str) -> RegResult<Self> {
        let (root, root_name, path) = parse_path(path, None)?;
        Ok(Self::from_parts(api, root, root_name, path, false))
    }

    /// Address a key by numeric root id and a path relative to it.
    pub fn with_root_id(api: &'a dyn RegistryApi, root_id: u32, path: &str) -> RegResult<Self> {
        let (root, root_name, path) = parse_path(path, Some(root_id))?;
        Ok(Self::from_parts(api, root, root_name, path, false))
    }

    /// Address a key by root and a path relative to it.
    pub fn with_root(api: &'a dyn RegistryApi, root: RootKey, path: &str) -> Self {
        Self::from_parts(api, root, root.name(), crate::root::normalize_path(path), false)
    }

    fn from_parts(
        api: &'a dyn RegistryApi,
        root: RootKey,
        root_name: &'static str,
        path: String,
        recursive: bool,
    ) -> Self {
        KeyHandle {
            api,
            root,
            root_name,
            path,
            recursive,
            native: None,
        }
    }

    /// Set the traversal mode used by [`KeyHandle::items`] and inherited by
    /// derived subkeys.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn root(&self) -> RootKey {
        self.root
    }

    pub fn root_name(&self) -> &'static str {
        self.root_name
    }

    /// Path relative to the root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path component (empty for a root key).
    pub fn name(&self) -> &str {
        leaf_name(&self.path)
    }

    /// Root-qualified path, e.g. `HKEY_USERS\.DEFAULT`.
    pub fn full_path(&self) -> String {
        if self.path.is_empty() {
            self.root_name.to_string()
        } else {
            format!("{}{}{}", self.root_name, PATH_SEPARATOR, self.path)
        }
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    pub fn is_open(&self) -> bool {
        self.native.is_some()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Acquire the native handle. A no-op if already open.
    ///
    /// A handle opened this way stays open until [`KeyHandle::close`] or drop;
    /// prefer [`KeyHandle::scoped`].
    pub fn open(&mut self) -> RegResult<()> {
        if self.native.is_some() {
            return Ok(());
        }
        let handle = self.api.open_key(self.root, &self.path)?;
        debug!("opened {} as {}", self, handle);
        self.native = Some(handle);
        Ok(())
    }

    /// Release the native handle, if any. Never fails.
    pub fn close(&mut self) {
        if let Some(handle) = self.native.take() {
            debug!("closing {} ({})", self, handle);
            self.api.close_key(handle);
        }
    }

    /// Open for the lifetime of the returned guard.
    ///
    /// The guard closes the key when dropped, on every exit path, unless the
    /// key was already open before the call (then the earlier opener keeps
    /// ownership of the handle).
    pub fn scoped(&mut self) -> RegResult<OpenKey<'_, 'a>> {
        let acquired = !self.is_open();
        self.open()?;
        Ok(OpenKey {
            key: self,
            acquired,
        })
    }

    /// Run `f` with the key open, closing it afterwards.
    pub fn with_open<T>(&mut self, f: impl FnOnce(&KeyHandle<'a>) -> RegResult<T>) -> RegResult<T> {
        let key = self.scoped()?;
        f(&*key)
    }

    /// The native handle, or `KeyNotOpen`.
    pub(crate) fn native(&self) -> RegResult<NativeHandle> {
        self.native
            .ok_or_else(|| RegError::key_not_open(self.full_path()))
    }

    // ── Navigation and lookup ────────────────────────────────────────

    /// Derive an unopened handle to `sub_path` below this key.
    ///
    /// `recursive` overrides the traversal mode; `None` inherits this key's.
    pub fn subkey(&self, sub_path: &str, recursive: Option<bool>) -> RegResult<KeyHandle<'a>> {
        self.native()?;
        Ok(Self::from_parts(
            self.api,
            self.root,
            self.root_name,
            join_path(&self.path, sub_path),
            recursive.unwrap_or(self.recursive),
        ))
    }

    /// Look up a named value. An empty name is the key's default value.
    pub fn value(&self, name: &str) -> RegResult<ValueRecord> {
        let handle = self.native()?;
        match self.api.query_value(handle, name) {
            Ok(value) => Ok(value),
            Err(RegError::ValueNotFound { .. }) => {
                Err(RegError::value_not_found(name, self.full_path()))
            }
            Err(e) => Err(e),
        }
    }

    /// Look up `name` as a value first, then as a subkey.
    ///
    /// Registry paths do not distinguish a value named `X` from a subkey
    /// named `X`. Only a missing value falls through to the subkey lookup; a
    /// closed key or any other failure is returned as is. A subkey is
    /// returned unopened, after checking that it exists.
    pub fn item(&self, name: &str) -> RegResult<RegItem<'a>> {
        match self.value(name) {
            Ok(value) => Ok(RegItem::Value(value)),
            Err(RegError::ValueNotFound { .. }) => {
                let child = self.subkey(name, None)?;
                child.check_exists()?;
                Ok(RegItem::Key(child))
            }
            Err(e) => Err(e),
        }
    }

    /// Check that the key exists without keeping it open.
    fn check_exists(&self) -> RegResult<()> {
        let handle = self.api.open_key(self.root, &self.path)?;
        trace!("checked {} ({})", self, handle);
        self.api.close_key(handle);
        Ok(())
    }
}

impl Drop for KeyHandle<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Display for KeyHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_path())
    }
}

impl fmt::Debug for KeyHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHandle")
            .field("root", &self.root_name)
            .field("path", &self.path)
            .field("recursive", &self.recursive)
            .field("native", &self.native)
            .finish()
    }
}

/// Guard returned by [`KeyHandle::scoped`]; closes the key on drop.
pub struct OpenKey<'k, 'a> {
    key: &'k mut KeyHandle<'a>,
    acquired: bool,
}

impl<'a> Deref for OpenKey<'_, 'a> {
    type Target = KeyHandle<'a>;

    fn deref(&self) -> &Self::Target {
        &*self.key
    }
}

impl<'a> DerefMut for OpenKey<'_, 'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.key
    }
}

impl Drop for OpenKey<'_, '_> {
    fn drop(&mut self) {
        if self.acquired {
            self.key.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryRegistry;
    use crate::value::{ValueData, ValueType};

    fn registry() -> MemoryRegistry {
        let reg = MemoryRegistry::new();
        reg.set_value(RootKey::CurrentUser, "Software\\Vendor", "Name", "app", ValueType::SZ);
        reg.set_value(RootKey::CurrentUser, "Software\\Vendor", "", "default", ValueType::SZ);
        reg.create_key(RootKey::CurrentUser, "Software\\Vendor\\Settings");
        reg
    }

    #[test]
    fn test_new_parses_root_and_path() {
        let reg = registry();
        let key = KeyHandle::new(&reg, "hkey_current_user\\Software\\Vendor").unwrap();
        assert_eq!(key.root(), RootKey::CurrentUser);
        assert_eq!(key.root_name(), "HKEY_CURRENT_USER");
        assert_eq!(key.path(), "Software\\Vendor");
        assert_eq!(key.name(), "Vendor");
        assert_eq!(key.to_string(), "HKEY_CURRENT_USER\\Software\\Vendor");
        assert!(!key.is_open());
        assert!(!key.is_recursive());
    }

    #[test]
    fn test_unknown_root_builds_nothing() {
        let reg = registry();
        assert!(matches!(
            KeyHandle::new(&reg, "HKEY_SOMEWHERE\\Software"),
            Err(RegError::UnknownRoot(_))
        ));
        assert!(matches!(
            KeyHandle::with_root_id(&reg, 42, "Software"),
            Err(RegError::UnknownRoot(_))
        ));
    }

    #[test]
    fn test_with_root_id() {
        let reg = registry();
        let mut key =
            KeyHandle::with_root_id(&reg, RootKey::CurrentUser.id(), "\\Software\\Vendor").unwrap();
        let key = key.scoped().unwrap();
        assert_eq!(key.value("Name").unwrap().data, ValueData::from("app"));
    }

    #[test]
    fn test_closed_key_rejects_reads() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_CURRENT_USER\\Software\\Vendor").unwrap();
        key.open().unwrap();
        key.close();
        assert!(!key.is_open());
        assert!(matches!(key.value("Name"), Err(RegError::KeyNotOpen { .. })));
        assert!(matches!(key.item("Name"), Err(RegError::KeyNotOpen { .. })));
        assert!(matches!(key.subkey("Settings", None), Err(RegError::KeyNotOpen { .. })));
        assert!(matches!(key.key_names(), Err(RegError::KeyNotOpen { .. })));
        assert!(matches!(key.values(), Err(RegError::KeyNotOpen { .. })));
        assert!(matches!(key.items(), Err(RegError::KeyNotOpen { .. })));
        assert!(matches!(key.to_mapping(false), Err(RegError::KeyNotOpen { .. })));
        // closing twice is harmless
        key.close();
        assert_eq!(reg.open_handle_count(), 0);
    }

    #[test]
    fn test_open_missing_key_propagates() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_CURRENT_USER\\Software\\Nope").unwrap();
        let err = key.open().unwrap_err();
        assert!(matches!(err, RegError::KeyNotFound { .. }));
        assert!(!key.is_open());
    }

    #[test]
    fn test_scoped_closes_on_drop() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_CURRENT_USER\\Software").unwrap();
        {
            let open = key.scoped().unwrap();
            assert!(open.is_open());
            assert_eq!(reg.open_handle_count(), 1);
        }
        assert!(!key.is_open());
        assert_eq!(reg.open_handle_count(), 0);
    }

    #[test]
    fn test_scoped_closes_on_error_path() {
        fn lookup(key: &mut KeyHandle<'_>) -> RegResult<ValueRecord> {
            let key = key.scoped()?;
            key.value("Missing")
        }

        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_CURRENT_USER\\Software\\Vendor").unwrap();
        assert!(lookup(&mut key).is_err());
        assert!(!key.is_open());
        assert_eq!(reg.open_handle_count(), 0);
    }

    #[test]
    fn test_nested_scope_keeps_outer_open() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_CURRENT_USER\\Software").unwrap();
        key.open().unwrap();
        {
            let _inner = key.scoped().unwrap();
        }
        assert!(key.is_open());
        key.open().unwrap();
        assert_eq!(reg.open_handle_count(), 1);
        drop(key);
        assert_eq!(reg.open_handle_count(), 0);
    }

    #[test]
    fn test_reopen_after_close() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_CURRENT_USER\\Software\\Vendor").unwrap();
        for _ in 0..2 {
            let open = key.scoped().unwrap();
            assert!(open.value("Name").is_ok());
        }
        assert_eq!(reg.open_handle_count(), 0);
    }

    #[test]
    fn test_with_open() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_CURRENT_USER\\Software\\Vendor").unwrap();
        let value = key.with_open(|k| k.value("")).unwrap();
        assert_eq!(value.data, ValueData::from("default"));
        assert!(!key.is_open());
    }

    #[test]
    fn test_subkey_inherits_and_overrides_recursion() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_CURRENT_USER\\Software")
            .unwrap()
            .recursive(true);
        let key = key.scoped().unwrap();
        let child = key.subkey("Vendor\\Settings", None).unwrap();
        assert_eq!(child.path(), "Software\\Vendor\\Settings");
        assert_eq!(child.root(), RootKey::CurrentUser);
        assert!(child.is_recursive());
        assert!(!child.is_open());
        assert!(!key.subkey("Vendor", Some(false)).unwrap().is_recursive());
    }

    #[test]
    fn test_value_lookup() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_CURRENT_USER\\Software\\Vendor").unwrap();
        let key = key.scoped().unwrap();
        let value = key.value("Name").unwrap();
        assert_eq!(value.name, "Name");
        assert_eq!(value.value_type, ValueType::SZ);
        let err = key.value("Missing").unwrap_err();
        assert!(matches!(err, RegError::ValueNotFound { .. }));
        assert!(err.to_string().contains("HKEY_CURRENT_USER\\Software\\Vendor"));
    }

    #[test]
    fn test_item_prefers_value_then_subkey() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_CURRENT_USER\\Software\\Vendor").unwrap();
        let key = key.scoped().unwrap();

        let item = key.item("Name").unwrap();
        assert_eq!(item.as_value().unwrap().data, ValueData::from("app"));

        let item = key.item("Settings").unwrap();
        let sub = item.as_key().unwrap();
        assert!(!sub.is_open());
        assert_eq!(sub.path(), "Software\\Vendor\\Settings");

        let err = key.item("Neither").unwrap_err();
        assert!(err.is_not_found());
        // the existence check must not leak a handle
        assert_eq!(reg.open_handle_count(), 1);
    }
}
