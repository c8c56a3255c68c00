//! Synthetic host for testing
//!
//! Implements every host trait over an in-memory model: mapped regions with
//! protection, a module list, a recorder for module loads, registered native
//! stubs standing in for foreign functions, and an interceptor whose entry
//! events are fired by the test.

use super::{
    CallShape, EntryContext, EntryListener, Interceptor, MemoryAccess, ModuleQuery, NativeCaller,
    RegisterValue, ScratchBuffer,
};
use crate::core::types::{Address, ModuleInfo, ProbeError, ProbeResult, Protection};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

/// Stand-in for a foreign function. Receives the host so it can write into
/// mock memory through its pointer arguments.
pub type NativeStub = Arc<dyn Fn(&MockHost, &[usize]) -> usize + Send + Sync>;

/// Where mock scratch buffers are carved from
pub const SCRATCH_BASE: usize = 0x7FFF_0000;

#[derive(Debug, Clone)]
struct Region {
    data: Vec<u8>,
    protection: Protection,
}

/// A native call the mock host has served
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub target: Address,
    pub shape: CallShape,
    pub args: Vec<usize>,
}

#[derive(Default)]
struct InterceptorState {
    probes: Vec<(Address, Arc<dyn EntryListener>)>,
    detach_all_calls: usize,
}

/// Mock host implementation for testing
pub struct MockHost {
    pointer_size: usize,
    regions: RwLock<BTreeMap<usize, Region>>,
    modules: RwLock<Vec<ModuleInfo>>,
    loadable: RwLock<HashSet<String>>,
    load_calls: Mutex<Vec<String>>,
    stubs: RwLock<BTreeMap<usize, NativeStub>>,
    calls: Mutex<Vec<RecordedCall>>,
    next_scratch: Mutex<usize>,
    interceptor: Mutex<InterceptorState>,
}

impl MockHost {
    /// Create an empty host with the given pointer width
    pub fn new(pointer_size: usize) -> Self {
        MockHost {
            pointer_size,
            regions: RwLock::new(BTreeMap::new()),
            modules: RwLock::new(Vec::new()),
            loadable: RwLock::new(HashSet::new()),
            load_calls: Mutex::new(Vec::new()),
            stubs: RwLock::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            next_scratch: Mutex::new(SCRATCH_BASE),
            interceptor: Mutex::new(InterceptorState::default()),
        }
    }

    /// Map a zero-filled region
    pub fn map_region(&self, address: usize, size: usize, protection: Protection) {
        self.regions.write().unwrap().insert(
            address,
            Region {
                data: vec![0u8; size],
                protection,
            },
        );
    }

    /// Write bytes. Patches the containing region when there is one,
    /// otherwise maps a new read-write region of exactly `data.len()` bytes.
    pub fn write_memory(&self, address: usize, data: &[u8]) {
        let mut regions = self.regions.write().unwrap();
        let containing = regions
            .range_mut(..=address)
            .next_back()
            .filter(|(&base, region)| address + data.len() <= base + region.data.len());

        match containing {
            Some((&base, region)) => {
                let start = address - base;
                region.data[start..start + data.len()].copy_from_slice(data);
            }
            None => {
                regions.insert(
                    address,
                    Region {
                        data: data.to_vec(),
                        protection: Protection::READ_WRITE,
                    },
                );
            }
        }
    }

    /// Write a pointer of the host's width
    pub fn write_pointer(&self, address: usize, value: usize) {
        match self.pointer_size {
            4 => self.write_memory(address, &(value as u32).to_le_bytes()),
            _ => self.write_memory(address, &(value as u64).to_le_bytes()),
        }
    }

    pub fn write_i32(&self, address: usize, value: i32) {
        self.write_memory(address, &value.to_le_bytes());
    }

    pub fn write_u64(&self, address: usize, value: u64) {
        self.write_memory(address, &value.to_le_bytes());
    }

    /// Register a module; the first one added is the main module
    pub fn add_module(&self, module: ModuleInfo) {
        self.modules.write().unwrap().push(module);
    }

    /// Let `load_module(name)` succeed
    pub fn allow_load(&self, name: &str) {
        self.loadable.write().unwrap().insert(name.to_lowercase());
    }

    /// Every name passed to `load_module`, successful or not
    pub fn load_calls(&self) -> Vec<String> {
        self.load_calls.lock().unwrap().clone()
    }

    /// Make `address` callable through [`NativeCaller::invoke`]
    pub fn register_stub<F>(&self, address: usize, stub: F)
    where
        F: Fn(&MockHost, &[usize]) -> usize + Send + Sync + 'static,
    {
        self.stubs.write().unwrap().insert(address, Arc::new(stub));
    }

    /// Native calls served so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Deliver an entry event to every probe attached at `function`.
    /// Returns how many listeners saw it.
    pub fn fire_entry(&self, function: Address, arguments: &[usize], receiver: usize) -> usize {
        let listeners: Vec<Arc<dyn EntryListener>> = {
            let state = self.interceptor.lock().unwrap();
            state
                .probes
                .iter()
                .filter(|(address, _)| *address == function)
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        };

        let context = EntryContext {
            function,
            thread_id: 1,
            arguments: arguments.to_vec(),
            receiver: RegisterValue {
                name: "ecx",
                value: receiver,
            },
        };

        // Lock released so listeners may call detach_all
        for listener in &listeners {
            listener.on_enter(&context);
        }
        listeners.len()
    }

    /// How many times `detach_all` has been called
    pub fn detach_all_calls(&self) -> usize {
        self.interceptor.lock().unwrap().detach_all_calls
    }

    fn region_for(&self, address: usize) -> Option<(usize, Region)> {
        let regions = self.regions.read().unwrap();
        regions
            .range(..=address)
            .next_back()
            .filter(|(&base, region)| address < base + region.data.len())
            .map(|(&base, region)| (base, region.clone()))
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new(std::mem::size_of::<usize>())
    }
}

impl MemoryAccess for MockHost {
    fn pointer_size(&self) -> usize {
        self.pointer_size
    }

    fn read_bytes(&self, address: Address, size: usize) -> ProbeResult<Vec<u8>> {
        let addr = address.as_usize();
        let (base, region) = self
            .region_for(addr)
            .ok_or_else(|| ProbeError::read_failed(address, "address not mapped"))?;

        if !region.protection.is_readable() {
            return Err(ProbeError::read_failed(
                address,
                format!("access violation (protection {})", region.protection),
            ));
        }

        let start = addr - base;
        let end = start
            .checked_add(size)
            .filter(|&end| end <= region.data.len())
            .ok_or_else(|| ProbeError::read_failed(address, "read crosses end of region"))?;

        Ok(region.data[start..end].to_vec())
    }

    fn query_protection(&self, address: Address) -> ProbeResult<Option<Protection>> {
        Ok(self
            .region_for(address.as_usize())
            .map(|(_, region)| region.protection))
    }

    fn alloc_scratch(&self, size: usize) -> ProbeResult<ScratchBuffer> {
        let address = {
            let mut next = self.next_scratch.lock().unwrap();
            let address = *next;
            *next += size.max(1).div_ceil(16) * 16;
            address
        };
        self.map_region(address, size, Protection::READ_WRITE);
        Ok(ScratchBuffer::external(Address::new(address), size))
    }
}

impl ModuleQuery for MockHost {
    fn main_module(&self) -> ProbeResult<ModuleInfo> {
        self.modules
            .read()
            .unwrap()
            .first()
            .cloned()
            .ok_or_else(|| ProbeError::ModuleNotFound("main module".to_string()))
    }

    fn modules(&self) -> ProbeResult<Vec<ModuleInfo>> {
        Ok(self.modules.read().unwrap().clone())
    }

    fn load_module(&self, name: &str) -> ProbeResult<()> {
        self.load_calls.lock().unwrap().push(name.to_string());
        if self.loadable.read().unwrap().contains(&name.to_lowercase()) {
            Ok(())
        } else {
            Err(ProbeError::extension_load(name, "module not found"))
        }
    }
}

impl NativeCaller for MockHost {
    unsafe fn invoke(
        &self,
        target: Address,
        shape: &CallShape,
        args: &[usize],
    ) -> ProbeResult<usize> {
        if args.len() != shape.arity() {
            return Err(ProbeError::UnsupportedCallShape(format!(
                "{} declared {} parameters, got {} arguments",
                shape,
                shape.arity(),
                args.len()
            )));
        }

        let stub = self
            .stubs
            .read()
            .unwrap()
            .get(&target.as_usize())
            .cloned()
            .ok_or_else(|| ProbeError::CallFailed(format!("no code at {}", target)))?;

        self.calls.lock().unwrap().push(RecordedCall {
            target,
            shape: shape.clone(),
            args: args.to_vec(),
        });

        Ok(stub(self, args))
    }
}

impl Interceptor for MockHost {
    fn attach(&self, target: Address, listener: Arc<dyn EntryListener>) -> ProbeResult<()> {
        if self.region_for(target.as_usize()).is_none() {
            return Err(ProbeError::intercept_failed(target, "address not mapped"));
        }
        self.interceptor
            .lock()
            .unwrap()
            .probes
            .push((target, listener));
        Ok(())
    }

    fn detach_all(&self) {
        let mut state = self.interceptor.lock().unwrap();
        state.probes.clear();
        state.detach_all_calls += 1;
    }

    fn active_probes(&self) -> usize {
        let state = self.interceptor.lock().unwrap();
        let mut targets: Vec<Address> = state.probes.iter().map(|(address, _)| *address).collect();
        targets.sort();
        targets.dedup();
        targets.len()
    }
}
