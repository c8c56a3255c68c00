//! Loaded module descriptions

use super::Address;
use serde::{Deserialize, Serialize};

/// A module mapped into the target process.
///
/// Queried on demand and never cached: the entry goes stale if the module
/// is unloaded after the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub base_address: Address,
    pub size: usize,
}

impl ModuleInfo {
    /// Creates a new ModuleInfo
    pub fn new(name: impl Into<String>, base_address: Address, size: usize) -> Self {
        ModuleInfo {
            name: name.into(),
            base_address,
            size,
        }
    }

    /// Gets the end address of the module (exclusive)
    pub fn end_address(&self) -> Address {
        self.base_address.add(self.size)
    }

    /// Checks if an address is within `[base, base + size)`
    pub fn contains_address(&self, address: Address) -> bool {
        address
            .offset_from(self.base_address)
            .map_or(false, |delta| delta < self.size)
    }

    /// Offset of `address` inside this module, if it is contained
    pub fn offset_of(&self, address: Address) -> Option<usize> {
        address
            .offset_from(self.base_address)
            .filter(|&delta| delta < self.size)
    }
}
