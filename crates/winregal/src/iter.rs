//! Lazy enumeration over a key's children.
//!
//! All iterators query the backend by index (0, 1, 2, ...) until it reports
//! no more entries. Exhaustion ends the iterator; a real error is yielded
//! once and the iterator is fused afterwards. Each iterator borrows its key,
//! so the key cannot be closed while one is alive.

use crate::api::{NativeHandle, RegistryApi};
use crate::error::{RegError, RegResult};
use crate::key::{KeyHandle, RegItem};
use crate::value::ValueRecord;
use std::iter::FusedIterator;
use tracing::trace;

/// Names of a key's direct subkeys.
pub struct KeyNames<'k> {
    api: &'k dyn RegistryApi,
    handle: NativeHandle,
    index: u32,
    done: bool,
}

impl Iterator for KeyNames<'_> {
    type Item = RegResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.api.enum_key_at(self.handle, self.index) {
            Ok(Some(name)) => {
                self.index += 1;
                Some(Ok(name))
            }
            Ok(None) => {
                trace!("{}: {} subkeys", self.handle, self.index);
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for KeyNames<'_> {}

/// A key's direct values.
pub struct Values<'k> {
    api: &'k dyn RegistryApi,
    handle: NativeHandle,
    index: u32,
    done: bool,
}

impl Iterator for Values<'_> {
    type Item = RegResult<ValueRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.api.enum_value_at(self.handle, self.index) {
            Ok(Some(value)) => {
                self.index += 1;
                Some(Ok(value))
            }
            Ok(None) => {
                trace!("{}: {} values", self.handle, self.index);
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for Values<'_> {}

enum Phase {
    Values(u32),
    Keys(u32),
}

struct Frame<'a> {
    /// Descendant opened by the iterator; `None` for the starting key.
    key: Option<KeyHandle<'a>>,
    phase: Phase,
}

/// Values and subkeys of a key, descending into subkeys when the key is
/// recursive.
///
/// For every key visited, its values come first, then each subkey: the
/// unopened subkey handle is yielded, and in recursive mode the subkey's
/// own items follow before the next sibling. A subkey is opened only on the
/// call after it was yielded, so a subkey that cannot be opened is still
/// yielded before the error. Descendants opened for that purpose are owned
/// by the iterator and closed as soon as their subtree is exhausted, on
/// error, or when the iterator is dropped.
pub struct Items<'k, 'a> {
    origin: &'k KeyHandle<'a>,
    stack: Vec<Frame<'a>>,
    /// Subkey yielded last, descended into on the next call.
    pending: Option<KeyHandle<'a>>,
}

impl<'k, 'a> Items<'k, 'a> {
    fn fail(&mut self, e: RegError) -> Option<RegResult<RegItem<'a>>> {
        // Dropping the frames closes every descendant still open.
        self.stack.clear();
        self.pending = None;
        Some(Err(e))
    }
}

impl<'k, 'a> Iterator for Items<'k, 'a> {
    type Item = RegResult<RegItem<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let origin = self.origin;
            if let Some(mut descendant) = self.pending.take() {
                if let Err(e) = descendant.open() {
                    return self.fail(e);
                }
                self.stack.push(Frame {
                    key: Some(descendant),
                    phase: Phase::Values(0),
                });
            }
            let frame = self.stack.last_mut()?;
            let key = frame.key.as_ref().unwrap_or(origin);
            let handle = match key.native() {
                Ok(h) => h,
                Err(e) => return self.fail(e),
            };

            match frame.phase {
                Phase::Values(i) => match key.api.enum_value_at(handle, i) {
                    Ok(Some(value)) => {
                        frame.phase = Phase::Values(i + 1);
                        return Some(Ok(RegItem::Value(value)));
                    }
                    Ok(None) => frame.phase = Phase::Keys(0),
                    Err(e) => return self.fail(e),
                },
                Phase::Keys(i) => match key.api.enum_key_at(handle, i) {
                    Ok(Some(name)) => {
                        frame.phase = Phase::Keys(i + 1);
                        let child = match key.subkey(&name, None) {
                            Ok(child) => child,
                            Err(e) => return self.fail(e),
                        };
                        if key.recursive {
                            match key.subkey(&name, None) {
                                Ok(d) => self.pending = Some(d),
                                Err(e) => return self.fail(e),
                            }
                        }
                        return Some(Ok(RegItem::Key(child)));
                    }
                    Ok(None) => {
                        self.stack.pop();
                    }
                    Err(e) => return self.fail(e),
                },
            }
        }
    }
}

impl FusedIterator for Items<'_, '_> {}

impl<'a> KeyHandle<'a> {
    /// Lazily enumerate the names of direct subkeys.
    pub fn key_names(&self) -> RegResult<KeyNames<'_>> {
        Ok(KeyNames {
            api: self.api,
            handle: self.native()?,
            index: 0,
            done: false,
        })
    }

    /// Lazily enumerate direct values.
    pub fn values(&self) -> RegResult<Values<'_>> {
        Ok(Values {
            api: self.api,
            handle: self.native()?,
            index: 0,
            done: false,
        })
    }

    /// Lazily enumerate values and subkeys; recursive if this key is.
    pub fn items(&self) -> RegResult<Items<'_, 'a>> {
        self.native()?;
        Ok(Items {
            origin: self,
            stack: vec![Frame {
                key: None,
                phase: Phase::Values(0),
            }],
            pending: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryRegistry;
    use crate::root::RootKey;
    use crate::value::ValueType;

    fn registry() -> MemoryRegistry {
        let reg = MemoryRegistry::new();
        let root = RootKey::LocalMachine;
        reg.set_value(root, "SOFTWARE\\Vendor", "A", 1u32, ValueType::DWORD);
        reg.set_value(root, "SOFTWARE\\Vendor", "B", "x", ValueType::SZ);
        reg.set_value(root, "SOFTWARE\\Vendor\\C", "D", 2u32, ValueType::DWORD);
        reg.set_value(root, "SOFTWARE\\Vendor\\C\\E", "F", 3u32, ValueType::DWORD);
        reg.create_key(root, "SOFTWARE\\Vendor\\G");
        reg
    }

    fn describe(items: Items<'_, '_>) -> Vec<String> {
        items
            .map(|item| match item.unwrap() {
                RegItem::Value(v) => format!("value:{}", v.name),
                RegItem::Key(k) => {
                    assert!(!k.is_open());
                    format!("key:{}", k.path())
                }
            })
            .collect()
    }

    #[test]
    fn test_key_names_terminate() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_LOCAL_MACHINE\\SOFTWARE\\Vendor").unwrap();
        let key = key.scoped().unwrap();
        let mut names = key.key_names().unwrap();
        assert_eq!(names.next().unwrap().unwrap(), "C");
        assert_eq!(names.next().unwrap().unwrap(), "G");
        assert!(names.next().is_none());
        assert!(names.next().is_none());
    }

    #[test]
    fn test_values_terminate() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_LOCAL_MACHINE\\SOFTWARE\\Vendor").unwrap();
        let key = key.scoped().unwrap();
        let values: Vec<ValueRecord> = key.values().unwrap().map(Result::unwrap).collect();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].name, "A");
        assert_eq!(values[1].name, "B");
    }

    #[test]
    fn test_empty_key() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_LOCAL_MACHINE\\SOFTWARE\\Vendor\\G").unwrap();
        let key = key.scoped().unwrap();
        assert_eq!(key.key_names().unwrap().count(), 0);
        assert_eq!(key.values().unwrap().count(), 0);
        assert_eq!(key.items().unwrap().count(), 0);
    }

    #[test]
    fn test_items_direct_children_only() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_LOCAL_MACHINE\\SOFTWARE\\Vendor").unwrap();
        let key = key.scoped().unwrap();
        assert_eq!(
            describe(key.items().unwrap()),
            vec![
                "value:A",
                "value:B",
                "key:SOFTWARE\\Vendor\\C",
                "key:SOFTWARE\\Vendor\\G",
            ]
        );
        assert_eq!(reg.open_handle_count(), 1);
    }

    #[test]
    fn test_items_recursive() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_LOCAL_MACHINE\\SOFTWARE\\Vendor")
            .unwrap()
            .recursive(true);
        {
            let key = key.scoped().unwrap();
            assert_eq!(
                describe(key.items().unwrap()),
                vec![
                    "value:A",
                    "value:B",
                    "key:SOFTWARE\\Vendor\\C",
                    "value:D",
                    "key:SOFTWARE\\Vendor\\C\\E",
                    "value:F",
                    "key:SOFTWARE\\Vendor\\G",
                ]
            );
            assert_eq!(reg.open_handle_count(), 1);
        }
        assert_eq!(reg.open_handle_count(), 0);
    }

    #[test]
    fn test_items_recursive_children_inherit_mode() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_LOCAL_MACHINE\\SOFTWARE\\Vendor")
            .unwrap()
            .recursive(true);
        let key = key.scoped().unwrap();
        for item in key.items().unwrap() {
            if let RegItem::Key(k) = item.unwrap() {
                assert!(k.is_recursive());
            }
        }
    }

    #[test]
    fn test_dropping_recursive_iterator_closes_descendants() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_LOCAL_MACHINE\\SOFTWARE\\Vendor")
            .unwrap()
            .recursive(true);
        let key = key.scoped().unwrap();
        let mut items = key.items().unwrap();
        // A, B, C, D, E, F: C and E are open now
        for _ in 0..6 {
            items.next().unwrap().unwrap();
        }
        assert_eq!(reg.open_handle_count(), 3);
        drop(items);
        assert_eq!(reg.open_handle_count(), 1);
    }

    #[test]
    fn test_recursive_yields_subkey_before_open_failure() {
        let reg = registry();
        reg.deny(RootKey::LocalMachine, "SOFTWARE\\Vendor\\C");
        let mut key = KeyHandle::new(&reg, "HKEY_LOCAL_MACHINE\\SOFTWARE\\Vendor")
            .unwrap()
            .recursive(true);
        let key = key.scoped().unwrap();
        let mut items = key.items().unwrap();
        assert_eq!(items.next().unwrap().unwrap().as_value().unwrap().name, "A");
        assert_eq!(items.next().unwrap().unwrap().as_value().unwrap().name, "B");
        let c = items.next().unwrap().unwrap();
        assert_eq!(c.as_key().unwrap().path(), "SOFTWARE\\Vendor\\C");
        assert!(matches!(
            items.next().unwrap(),
            Err(RegError::AccessDenied { .. })
        ));
        assert!(items.next().is_none());
        assert_eq!(reg.open_handle_count(), 1);
    }

    #[test]
    fn test_error_fuses_iterator() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_LOCAL_MACHINE\\SOFTWARE\\Vendor").unwrap();
        let key = key.scoped().unwrap();
        let mut names = key.key_names().unwrap();
        reg.fail_next_enum("simulated");
        assert!(names.next().unwrap().is_err());
        assert!(names.next().is_none());
    }

    #[test]
    fn test_recursive_error_closes_descendants() {
        let reg = registry();
        let mut key = KeyHandle::new(&reg, "HKEY_LOCAL_MACHINE\\SOFTWARE\\Vendor")
            .unwrap()
            .recursive(true);
        let key = key.scoped().unwrap();
        let mut items = key.items().unwrap();
        for _ in 0..4 {
            items.next().unwrap().unwrap();
        }
        assert_eq!(reg.open_handle_count(), 2);
        reg.fail_next_enum("simulated");
        assert!(items.next().unwrap().is_err());
        assert_eq!(reg.open_handle_count(), 1);
        assert!(items.next().is_none());
    }
}
