//! [`RegistryApi`](crate::api::RegistryApi) implementations.
//!
//! - [`MemoryRegistry`]: an in-process tree, used for tests and fixtures
//! - [`HiveRegistry`]: offline `regf` hive files mounted under roots
//! - [`NativeRegistry`]: the live Windows registry (feature `native`)

mod hive;
mod memory;
#[cfg(all(windows, feature = "native"))]
mod native;

pub use hive::HiveRegistry;
pub use memory::MemoryRegistry;
#[cfg(all(windows, feature = "native"))]
pub use native::NativeRegistry;
