//! Core type definitions for vtable-probe
//!
//! Every value here is a view into target memory, never an owned copy.

mod address;
mod error;
mod module_info;
mod protection;

// Re-export all public types
pub use address::Address;
pub use error::{ProbeError, ProbeResult};
pub use module_info::ModuleInfo;
pub use protection::Protection;

// Common type aliases
pub type SlotIndex = usize;
