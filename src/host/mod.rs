//! Host runtime abstraction layer
//!
//! The probe never touches the target directly. Everything it needs from the
//! instrumentation host is expressed as one of these traits:
//! - memory reads, protection queries and scratch allocation
//! - module enumeration and loading
//! - native calls through a declared call shape
//! - entry interception with global detach

mod call;
pub mod mock;
mod scratch;

pub use call::{CallShape, CallingConvention, InProcessCaller, ParamKind, ReturnKind};
pub use scratch::ScratchBuffer;

use crate::core::types::{Address, ModuleInfo, ProbeError, ProbeResult, Protection};
use std::fmt;
use std::sync::Arc;

/// Upper bound on argument slots an interceptor captures per entry
pub const MAX_ARGUMENT_SLOTS: usize = 16;

/// Read access to target memory
pub trait MemoryAccess: Send + Sync {
    /// Pointer width of the target in bytes
    fn pointer_size(&self) -> usize;

    /// Read raw bytes. Unmapped or protected memory is an error, never a crash.
    fn read_bytes(&self, address: Address, size: usize) -> ProbeResult<Vec<u8>>;

    /// Protection of the page holding `address`; `None` when nothing is mapped there
    fn query_protection(&self, address: Address) -> ProbeResult<Option<Protection>>;

    /// Allocate a scratch buffer a native call in the target can write into
    fn alloc_scratch(&self, size: usize) -> ProbeResult<ScratchBuffer>;

    /// Read a pointer of an explicit width (4 or 8 bytes)
    fn read_pointer_of(&self, address: Address, width: usize) -> ProbeResult<Address> {
        let bytes = self.read_bytes(address, width)?;
        match (width, bytes.len()) {
            (4, 4) => Ok(Address::from(
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize,
            )),
            (8, 8) => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes);
                Ok(Address::from(u64::from_le_bytes(raw)))
            }
            (4, _) | (8, _) => Err(ProbeError::read_failed(
                address,
                format!("short read of {} bytes", bytes.len()),
            )),
            _ => Err(ProbeError::UnsupportedOperation(format!(
                "pointer width {}",
                width
            ))),
        }
    }

    /// Read a target-width pointer
    fn read_pointer(&self, address: Address) -> ProbeResult<Address> {
        self.read_pointer_of(address, self.pointer_size())
    }

    fn read_u32(&self, address: Address) -> ProbeResult<u32> {
        let bytes = self.read_bytes(address, 4)?;
        let raw: [u8; 4] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ProbeError::read_failed(address, "short read"))?;
        Ok(u32::from_le_bytes(raw))
    }

    fn read_i32(&self, address: Address) -> ProbeResult<i32> {
        self.read_u32(address).map(|value| value as i32)
    }

    fn read_u64(&self, address: Address) -> ProbeResult<u64> {
        let bytes = self.read_bytes(address, 8)?;
        let raw: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ProbeError::read_failed(address, "short read"))?;
        Ok(u64::from_le_bytes(raw))
    }
}

/// Module enumeration and loading
pub trait ModuleQuery: Send + Sync {
    /// The main executable image of the target
    fn main_module(&self) -> ProbeResult<ModuleInfo>;

    /// Every module currently loaded
    fn modules(&self) -> ProbeResult<Vec<ModuleInfo>>;

    /// Module whose `[base, base + size)` contains `address`
    fn find_module_by_address(&self, address: Address) -> ProbeResult<Option<ModuleInfo>> {
        Ok(self
            .modules()?
            .into_iter()
            .find(|module| module.contains_address(address)))
    }

    /// Load a module into the target. The loaded image is opaque to the probe.
    fn load_module(&self, name: &str) -> ProbeResult<()>;
}

/// Invocation primitive for foreign functions
pub trait NativeCaller: Send + Sync {
    /// Call `target` with `args` according to `shape`, returning the
    /// pointer-sized return value.
    ///
    /// # Safety
    /// `target` must be a function compiled for exactly `shape`. A mismatch
    /// is undefined behaviour in the callee and cannot be detected here.
    unsafe fn invoke(&self, target: Address, shape: &CallShape, args: &[usize])
        -> ProbeResult<usize>;
}

/// A register captured at probe entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterValue {
    pub name: &'static str,
    pub value: usize,
}

/// Machine state observed when a probed function is entered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryContext {
    pub function: Address,
    pub thread_id: u32,
    /// Argument slots in call order, at most [`MAX_ARGUMENT_SLOTS`]
    pub arguments: Vec<usize>,
    /// The implicit-receiver register of the caller
    pub receiver: RegisterValue,
}

impl EntryContext {
    /// The `n`th argument slot, if it was captured
    pub fn argument(&self, n: usize) -> Option<usize> {
        self.arguments.get(n).copied()
    }
}

/// Callback invoked on entry to an intercepted function. May run on any
/// target thread, concurrently with other invocations.
pub trait EntryListener: Send + Sync {
    fn on_enter(&self, context: &EntryContext);
}

/// Entry interception
pub trait Interceptor: Send + Sync {
    /// Install an entry probe on `target`
    fn attach(&self, target: Address, listener: Arc<dyn EntryListener>) -> ProbeResult<()>;

    /// Remove every active probe, not only the caller's
    fn detach_all(&self);

    /// Number of addresses currently probed
    fn active_probes(&self) -> usize;
}

/// Everything the probe pipeline needs from its host
pub trait HostRuntime: MemoryAccess + ModuleQuery + NativeCaller + Interceptor {}

impl<T> HostRuntime for T where T: MemoryAccess + ModuleQuery + NativeCaller + Interceptor {}

impl fmt::Debug for dyn EntryListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryListener").finish_non_exhaustive()
    }
}

impl fmt::Debug for dyn Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor").finish_non_exhaustive()
    }
}
