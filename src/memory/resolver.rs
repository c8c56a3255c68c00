//! Address resolution from build-relative offsets
//!
//! A single best-effort pass: every link is dereferenced once and a failed
//! or null link aborts the walk. The resolved object is never shape-checked;
//! a layout from the wrong build yields wrong-but-plausible addresses, which
//! is what attribution is for.

use crate::config::LayoutConfig;
use crate::core::types::{Address, ProbeError, ProbeResult, SlotIndex};
use crate::host::MemoryAccess;
use serde::Serialize;
use tracing::debug;

/// Chain level of the inner context dereference
pub const LEVEL_INNER_CONTEXT: usize = 1;
/// Chain level of the vtable dereference
pub const LEVEL_VTABLE: usize = 2;

/// A virtual dispatch table in target memory. Length is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VTableView {
    pub address: Address,
    pub pointer_size: usize,
}

impl VTableView {
    pub fn new(address: Address, pointer_size: usize) -> Self {
        VTableView {
            address,
            pointer_size,
        }
    }

    /// Address of slot `index`: `vtable + index * pointer_size`
    pub fn slot_address(&self, index: SlotIndex) -> Address {
        self.address.add(index.wrapping_mul(self.pointer_size))
    }

    /// Function pointer stored in slot `index`
    pub fn read_slot<M>(&self, memory: &M, index: SlotIndex) -> ProbeResult<Address>
    where
        M: MemoryAccess + ?Sized,
    {
        memory.read_pointer_of(self.slot_address(index), self.pointer_size)
    }

    /// Function pointers of the first `count` slots
    pub fn slots<M>(&self, memory: &M, count: usize) -> ProbeResult<Vec<Address>>
    where
        M: MemoryAccess + ?Sized,
    {
        (0..count).map(|index| self.read_slot(memory, index)).collect()
    }
}

/// Result of walking the pointer chain. Views into target memory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedChain {
    pub module_base: Address,
    pub context: Address,
    pub inner_context: Address,
    pub vtable: VTableView,
}

/// Walks module base → context → inner context → vtable
pub struct AddressResolver<'a, M: MemoryAccess + ?Sized> {
    memory: &'a M,
    layout: &'a LayoutConfig,
    pointer_size: usize,
}

impl<'a, M: MemoryAccess + ?Sized> AddressResolver<'a, M> {
    /// Create a resolver; the layout's pointer width wins over the host's
    pub fn new(memory: &'a M, layout: &'a LayoutConfig) -> ProbeResult<Self> {
        let pointer_size = layout.pointer_size.unwrap_or_else(|| memory.pointer_size());
        if pointer_size != 4 && pointer_size != 8 {
            return Err(ProbeError::UnsupportedOperation(format!(
                "pointer width {}",
                pointer_size
            )));
        }

        Ok(AddressResolver {
            memory,
            layout,
            pointer_size,
        })
    }

    pub fn pointer_size(&self) -> usize {
        self.pointer_size
    }

    /// `module_base + (context_offset - reference_image_base)`
    pub fn context_address(&self, module_base: Address) -> ProbeResult<Address> {
        let relative = self.layout.module_relative_context().ok_or_else(|| {
            ProbeError::InvalidAddress(format!(
                "context offset 0x{:X} below reference image base 0x{:X}",
                self.layout.context_offset, self.layout.reference_image_base
            ))
        })?;

        module_base.checked_add(relative).ok_or_else(|| {
            ProbeError::InvalidAddress(format!("{} + 0x{:X} overflows", module_base, relative))
        })
    }

    /// Dereference the inner context pointer held by the context object
    pub fn inner_context(&self, context: Address) -> ProbeResult<Address> {
        let field = context.add(self.layout.inner_context_offset);
        self.follow(field, LEVEL_INNER_CONTEXT)
    }

    /// Dereference the vtable pointer held by the inner context
    pub fn vtable(&self, inner_context: Address) -> ProbeResult<VTableView> {
        let field = inner_context.add(self.layout.vtable_offset);
        let address = self.follow(field, LEVEL_VTABLE)?;
        Ok(VTableView::new(address, self.pointer_size))
    }

    /// Full walk from the main module base
    pub fn resolve(&self, module_base: Address) -> ProbeResult<ResolvedChain> {
        let context = self.context_address(module_base)?;
        debug!("context {} (module base {})", context, module_base);

        let inner_context = self.inner_context(context)?;
        debug!("inner context {}", inner_context);

        let vtable = self.vtable(inner_context)?;
        debug!("vtable {}", vtable.address);

        Ok(ResolvedChain {
            module_base,
            context,
            inner_context,
            vtable,
        })
    }

    /// Flag word stored on the context object
    pub fn read_flag(&self, context: Address) -> ProbeResult<i32> {
        self.memory.read_i32(context.add(self.layout.flag_offset))
    }

    /// Pointer-sized value at the head of the context object
    pub fn read_context_head(&self, context: Address) -> ProbeResult<Address> {
        self.memory.read_pointer_of(context, self.pointer_size)
    }

    fn follow(&self, field: Address, level: usize) -> ProbeResult<Address> {
        let target = self
            .memory
            .read_pointer_of(field, self.pointer_size)
            .map_err(|err| ProbeError::pointer_chain_broken(level, err.to_string()))?;

        if target.is_null() {
            return Err(ProbeError::pointer_chain_broken(
                level,
                format!("null pointer at {}", field),
            ));
        }
        Ok(target)
    }
}
