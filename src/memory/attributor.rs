//! Module attribution of resolved addresses

use crate::core::types::{Address, ModuleInfo, ProbeResult, Protection};
use crate::host::{MemoryAccess, ModuleQuery};
use serde::Serialize;
use std::fmt;

/// Which module, if any, owns an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attribution {
    /// Inside `[module.base, module.base + module.size)`
    Owned { module: ModuleInfo, offset: usize },
    /// Mapped, but no loaded module covers it
    Unowned { protection: Protection },
    /// Nothing is mapped at the address
    Unmapped,
}

impl Attribution {
    pub fn module(&self) -> Option<&ModuleInfo> {
        match self {
            Attribution::Owned { module, .. } => Some(module),
            _ => None,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Attribution::Owned { .. })
    }
}

impl fmt::Display for Attribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribution::Owned { module, offset } => write!(
                f,
                "{}+0x{:X} (base {}, size 0x{:X})",
                module.name, offset, module.base_address, module.size
            ),
            Attribution::Unowned { protection } => write!(f, "no module, protection {}", protection),
            Attribution::Unmapped => write!(f, "no module, unmapped"),
        }
    }
}

/// Attributes addresses against the live module list
pub struct ModuleAttributor<'a, H: ?Sized> {
    host: &'a H,
}

impl<'a, H> ModuleAttributor<'a, H>
where
    H: MemoryAccess + ModuleQuery + ?Sized,
{
    pub fn new(host: &'a H) -> Self {
        ModuleAttributor { host }
    }

    /// Attribute `address`. The module list is queried fresh on every call.
    pub fn attribute(&self, address: Address) -> ProbeResult<Attribution> {
        if let Some(module) = self.host.find_module_by_address(address)? {
            if let Some(offset) = module.offset_of(address) {
                return Ok(Attribution::Owned { module, offset });
            }
        }

        Ok(match self.host.query_protection(address)? {
            Some(protection) => Attribution::Unowned { protection },
            None => Attribution::Unmapped,
        })
    }
}
