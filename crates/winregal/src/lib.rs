//! Dictionary-like access to the Windows registry hierarchy.
//!
//! A [`KeyHandle`] addresses a key by root-qualified path
//! (`HKEY_LOCAL_MACHINE\SOFTWARE\...`). Opened, it answers value and item
//! lookups, enumerates its subkeys and values lazily (optionally walking the
//! whole subtree), and flattens itself into nested maps.
//!
//! The store behind the handles is a [`RegistryApi`]:
//!
//! - [`backend::NativeRegistry`]: the live registry (Windows, feature `native`)
//! - [`backend::HiveRegistry`]: offline hive files read with [`regf`]
//! - [`backend::MemoryRegistry`]: an in-process tree
//!
//! # Example
//!
//! ```rust,ignore
//! use winregal::{backend::HiveRegistry, KeyHandle, RootKey};
//!
//! let mut registry = HiveRegistry::new();
//! registry.mount_file(RootKey::LocalMachine, "SOFTWARE", "SOFTWARE")?;
//!
//! let mut key = KeyHandle::new(&registry, r"HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft")?;
//! let key = key.scoped()?;
//! println!("{}", serde_json::to_string_pretty(&key.to_mapping(false)?)?);
//! ```

pub mod api;
pub mod backend;
pub mod error;
pub mod iter;
pub mod key;
pub mod mapping;
pub mod root;
pub mod value;

pub use api::{NativeHandle, RegistryApi};
pub use error::{RegError, RegResult};
pub use iter::{Items, KeyNames, Values};
pub use key::{KeyHandle, OpenKey, RegItem};
pub use mapping::{MappingEntry, RegMapping};
pub use root::{parse_path, RootKey, PATH_SEPARATOR};
pub use value::{ValueData, ValueRecord, ValueType};
