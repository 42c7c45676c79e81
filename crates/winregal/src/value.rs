//! Registry values.

use regf::reg_types::*;
use regf::utils::{read_utf16le_multi, read_utf16le_string};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque value type tag as reported by the backend.
///
/// The core passes it through untouched; the constants exist for display and
/// for backends that decode raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValueType(pub u32);

impl ValueType {
    pub const NONE: ValueType = ValueType(REG_NONE);
    pub const SZ: ValueType = ValueType(REG_SZ);
    pub const EXPAND_SZ: ValueType = ValueType(REG_EXPAND_SZ);
    pub const BINARY: ValueType = ValueType(REG_BINARY);
    pub const DWORD: ValueType = ValueType(REG_DWORD);
    pub const DWORD_BIG_ENDIAN: ValueType = ValueType(REG_DWORD_BIG_ENDIAN);
    pub const LINK: ValueType = ValueType(REG_LINK);
    pub const MULTI_SZ: ValueType = ValueType(REG_MULTI_SZ);
    pub const QWORD: ValueType = ValueType(REG_QWORD);

    /// Conventional `REG_*` name, if the tag is a well-known one.
    pub fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            REG_NONE => "REG_NONE",
            REG_SZ => "REG_SZ",
            REG_EXPAND_SZ => "REG_EXPAND_SZ",
            REG_BINARY => "REG_BINARY",
            REG_DWORD => "REG_DWORD",
            REG_DWORD_BIG_ENDIAN => "REG_DWORD_BIG_ENDIAN",
            REG_LINK => "REG_LINK",
            REG_MULTI_SZ => "REG_MULTI_SZ",
            REG_RESOURCE_LIST => "REG_RESOURCE_LIST",
            REG_FULL_RESOURCE_DESCRIPTOR => "REG_FULL_RESOURCE_DESCRIPTOR",
            REG_RESOURCE_REQUIREMENTS_LIST => "REG_RESOURCE_REQUIREMENTS_LIST",
            REG_QWORD => "REG_QWORD",
            _ => return None,
        })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "type {}", self.0),
        }
    }
}

/// A value's payload in the shape the platform API hands to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueData {
    None,
    String(String),
    MultiString(Vec<String>),
    Integer(u64),
    Binary(Vec<u8>),
}

impl ValueData {
    /// Decode raw bytes according to a type tag.
    ///
    /// Strings are UTF-16LE, integers little-endian (except
    /// REG_DWORD_BIG_ENDIAN). Short or unknown payloads fall back to
    /// [`ValueData::Binary`].
    pub fn from_raw(value_type: ValueType, bytes: &[u8]) -> Self {
        match value_type.0 {
            REG_SZ | REG_EXPAND_SZ | REG_LINK => ValueData::String(read_utf16le_string(bytes)),
            REG_MULTI_SZ => ValueData::MultiString(read_utf16le_multi(bytes)),
            REG_DWORD if bytes.len() >= 4 => ValueData::Integer(
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64,
            ),
            REG_DWORD_BIG_ENDIAN if bytes.len() >= 4 => ValueData::Integer(
                u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as u64,
            ),
            REG_QWORD if bytes.len() >= 8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                ValueData::Integer(u64::from_le_bytes(raw))
            }
            REG_NONE if bytes.is_empty() => ValueData::None,
            _ => ValueData::Binary(bytes.to_vec()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ValueData::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            ValueData::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for ValueData {
    fn from(s: &str) -> Self {
        ValueData::String(s.to_string())
    }
}

impl From<String> for ValueData {
    fn from(s: String) -> Self {
        ValueData::String(s)
    }
}

impl From<u32> for ValueData {
    fn from(v: u32) -> Self {
        ValueData::Integer(v as u64)
    }
}

impl From<u64> for ValueData {
    fn from(v: u64) -> Self {
        ValueData::Integer(v)
    }
}

impl From<Vec<u8>> for ValueData {
    fn from(v: Vec<u8>) -> Self {
        ValueData::Binary(v)
    }
}

impl From<Vec<String>> for ValueData {
    fn from(v: Vec<String>) -> Self {
        ValueData::MultiString(v)
    }
}

impl fmt::Display for ValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueData::None => f.write_str("(none)"),
            ValueData::String(s) => write!(f, "{:?}", s),
            ValueData::MultiString(items) => write!(f, "{:?}", items),
            ValueData::Integer(v) => write!(f, "{} ({:#x})", v, v),
            ValueData::Binary(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// A named, typed value under a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRecord {
    /// Name under the parent key; empty for the default value.
    pub name: String,
    pub data: ValueData,
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

impl ValueRecord {
    pub fn new(name: impl Into<String>, data: impl Into<ValueData>, value_type: ValueType) -> Self {
        ValueRecord {
            name: name.into(),
            data: data.into(),
            value_type,
        }
    }

    /// Build a record from undecoded bytes.
    pub fn from_raw(name: impl Into<String>, value_type: ValueType, bytes: &[u8]) -> Self {
        ValueRecord {
            name: name.into(),
            data: ValueData::from_raw(value_type, bytes),
            value_type,
        }
    }
}

impl fmt::Display for ValueRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &str = if self.name.is_empty() {
            "(Default)"
        } else {
            &self.name
        };
        write!(f, "{} = {} [{}]", name, self.data, self.value_type)
    }
}
