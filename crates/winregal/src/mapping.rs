//! Flattening a key's subtree into nested maps.

use crate::error::RegResult;
use crate::key::KeyHandle;
use crate::value::{ValueData, ValueRecord};
use serde::Serialize;
use std::collections::BTreeMap;

/// A key's subtree: child names mapped to values or nested subtrees.
pub type RegMapping = BTreeMap<String, MappingEntry>;

/// One entry of a [`RegMapping`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MappingEntry {
    /// Value data only.
    Data(ValueData),
    /// The full value record, when types are kept.
    Value(ValueRecord),
    /// A subkey's own mapping.
    Key(RegMapping),
}

impl MappingEntry {
    pub fn as_data(&self) -> Option<&ValueData> {
        match self {
            MappingEntry::Data(d) => Some(d),
            MappingEntry::Value(v) => Some(&v.data),
            MappingEntry::Key(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&ValueRecord> {
        match self {
            MappingEntry::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<&RegMapping> {
        match self {
            MappingEntry::Key(m) => Some(m),
            _ => None,
        }
    }
}

impl KeyHandle<'_> {
    /// Recursively read this key's values and subkeys into a map.
    ///
    /// Values map to their data, or to the whole [`ValueRecord`] when
    /// `keep_type` is set; nested subkeys keep full records too. Subkeys map
    /// to their own mapping; every subkey is opened for the duration of its
    /// traversal and closed again even when the traversal fails. A value and a subkey with the same name collide;
    /// the subkey is written last and wins.
    pub fn to_mapping(&self, keep_type: bool) -> RegResult<RegMapping> {
        let mut map = RegMapping::new();

        for value in self.values()? {
            let value = value?;
            let entry = if keep_type {
                MappingEntry::Value(value.clone())
            } else {
                MappingEntry::Data(value.data.clone())
            };
            map.insert(value.name, entry);
        }

        for name in self.key_names()? {
            let name = name?;
            let mut child = self.subkey(&name, Some(false))?;
            let child_map = child.with_open(|child| child.to_mapping(keep_type))?;
            map.insert(child.name().to_string(), MappingEntry::Key(child_map));
        }

        Ok(map)
    }

    /// [`KeyHandle::to_mapping`] as a JSON object.
    pub fn to_json(&self, keep_type: bool) -> RegResult<serde_json::Value> {
        let map = self.to_mapping(keep_type)?;
        serde_json::to_value(&map).map_err(|e| crate::error::RegError::Backend(e.to_string()))
    }
}
