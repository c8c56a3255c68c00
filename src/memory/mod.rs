//! Address resolution and module attribution
//!
//! - Walks module base → context → inner context → vtable
//! - Reads vtable slots
//! - Attributes any resolved address to its owning module, or reports the
//!   page protection when no module owns it

pub mod attributor;
pub mod resolver;

pub use attributor::{Attribution, ModuleAttributor};
pub use resolver::{AddressResolver, ResolvedChain, VTableView};
