//! The in-process host: the agent running inside the target

use super::bindings::{kernel32, psapi};
use super::breakpoint::BreakpointInterceptor;
use crate::core::types::{Address, ModuleInfo, ProbeResult, Protection};
use crate::host::{
    CallShape, EntryListener, InProcessCaller, Interceptor, MemoryAccess, ModuleQuery,
    NativeCaller, ScratchBuffer,
};
use std::sync::Arc;

/// Host backed by the Win32 API of the process the library is loaded into
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsHost {
    caller: InProcessCaller,
    interceptor: BreakpointInterceptor,
}

impl WindowsHost {
    pub fn new() -> Self {
        WindowsHost {
            caller: InProcessCaller::new(),
            interceptor: BreakpointInterceptor::new(),
        }
    }
}

impl MemoryAccess for WindowsHost {
    fn pointer_size(&self) -> usize {
        std::mem::size_of::<usize>()
    }

    fn read_bytes(&self, address: Address, size: usize) -> ProbeResult<Vec<u8>> {
        let mut buffer = vec![0u8; size];
        kernel32::read_memory(address.as_usize(), &mut buffer)?;
        Ok(buffer)
    }

    fn query_protection(&self, address: Address) -> ProbeResult<Option<Protection>> {
        Ok(kernel32::virtual_query(address.as_usize()).and_then(|info| info.protection()))
    }

    fn alloc_scratch(&self, size: usize) -> ProbeResult<ScratchBuffer> {
        Ok(ScratchBuffer::host_owned(size))
    }
}

impl ModuleQuery for WindowsHost {
    fn main_module(&self) -> ProbeResult<ModuleInfo> {
        psapi::module_info(psapi::main_module_handle()?)
    }

    fn modules(&self) -> ProbeResult<Vec<ModuleInfo>> {
        psapi::enum_process_modules()?
            .into_iter()
            .map(psapi::module_info)
            .collect()
    }

    fn load_module(&self, name: &str) -> ProbeResult<()> {
        kernel32::load_library(name)
    }
}

impl NativeCaller for WindowsHost {
    unsafe fn invoke(
        &self,
        target: Address,
        shape: &CallShape,
        args: &[usize],
    ) -> ProbeResult<usize> {
        self.caller.invoke(target, shape, args)
    }
}

impl Interceptor for WindowsHost {
    fn attach(&self, target: Address, listener: Arc<dyn EntryListener>) -> ProbeResult<()> {
        self.interceptor.attach(target, listener)
    }

    fn detach_all(&self) {
        self.interceptor.detach_all()
    }

    fn active_probes(&self) -> usize {
        self.interceptor.active_probes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Attribution, ModuleAttributor};

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_main_module_owns_its_code() {
        let host = WindowsHost::new();
        let main = host.main_module().unwrap();
        let attribution = ModuleAttributor::new(&host)
            .attribute(main.base_address.add(0x10))
            .unwrap();
        assert_eq!(attribution.module(), Some(&main));
    }

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_heap_is_unowned() {
        let host = WindowsHost::new();
        let boxed = Box::new(0u64);
        let attribution = ModuleAttributor::new(&host)
            .attribute(Address::from(&*boxed as *const u64))
            .unwrap();
        assert!(matches!(attribution, Attribution::Unowned { protection } if protection.write));
    }

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_read_pointer_in_process() {
        let host = WindowsHost::new();
        let target = 0x1234usize;
        let value = Address::from(&target as *const usize);
        assert_eq!(host.read_pointer(value).unwrap(), Address::new(0x1234));
    }
}
