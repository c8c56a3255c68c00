//! vtable-probe: in-process object and vtable introspection
//!
//! Resolves an object from build-specific offsets relative to the main
//! module, walks to its virtual dispatch table, attributes every address to
//! its owning module, optionally loads an extension module on a flag, and
//! invokes one virtual method to extract a 64-bit identifier. An inspection
//! mode enumerates the table and traces entries into one slot instead.
//!
//! # Architecture
//!
//! - **Host layer**: traits for memory, modules, native calls and interception
//! - **Memory**: pointer-chain resolution and module attribution
//! - **Probe**: extension loader, virtual call invoker, interception harness
//! - **Agent**: configuration, logging and the run itself

pub mod agent;
pub mod config;
pub mod core;
pub mod host;
pub mod memory;
pub mod probe;
#[cfg(windows)]
pub mod windows;

pub use crate::core::types::{Address, ModuleInfo, ProbeError, ProbeResult, Protection};
pub use crate::core::{AUTHORS, VERSION};
pub use agent::{init_logging, run_agent, AgentRun};
pub use config::Config;
pub use host::HostRuntime;
pub use memory::{AddressResolver, Attribution, ModuleAttributor, ResolvedChain, VTableView};
pub use probe::{Probe, ProbeReport};
