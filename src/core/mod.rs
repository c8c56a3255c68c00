//! Core module containing fundamental types for vtable-probe
//!
//! Address arithmetic, module descriptions, page protection and the error
//! type shared by every stage of the probe pipeline.

pub mod types;

// Re-export commonly used types for convenience
pub use types::{Address, ModuleInfo, ProbeError, ProbeResult, Protection};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
