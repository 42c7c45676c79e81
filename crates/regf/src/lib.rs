//! Reader for offline Windows registry hive (`regf`) files.
//!
//! Registry hive internals use well-known, stable binary formats
//! (HBASE_BLOCK, HBIN, NK/VK cells) that are consistent across Windows
//! versions. This crate provides:
//!
//! - [`HiveSource`] for reading hive bytes from a buffer or a mapped file
//! - [`HiveHeader`] parsing of the `regf` base block
//! - [`HiveReader`] for walking keys, subkey lists (lf/lh/li/ri) and values
//! - [`testing::HiveBuilder`] for producing small synthetic hives
//!
//! # Example
//!
//! ```rust,ignore
//! use regf::Hive;
//!
//! let hive = Hive::open("SOFTWARE")?;
//! let reader = hive.reader();
//! let run = reader.open_key("Microsoft\\Windows\\CurrentVersion\\Run")?;
//! for value in reader.values(&run)? {
//!     println!("{} ({})", value.name, value.value_type);
//! }
//! ```

pub mod error;
pub mod header;
pub mod reader;
pub mod source;
pub mod testing;
pub mod utils;

// Re-export key types at crate root.
pub use error::{RegfError, RegfResult};
pub use header::{HiveHeader, HBASE_BLOCK_SIZE};
pub use reader::{reg_types, Hive, HiveReader, KeyNode, KeyValue};
pub use source::{HiveSource, MappedHive};
