//! Software-breakpoint entry interception
//!
//! `attach` replaces the first byte of the target with `int3` and installs a
//! vectored exception handler once per process. On a hit the handler:
//! 1. Rebuilds an [`EntryContext`] from the thread's CONTEXT
//! 2. Calls the listeners with the registry unlocked
//! 3. Puts the original byte back and single-steps the instruction
//! 4. Re-arms the breakpoint from the single-step trap
//!
//! Between steps 3 and 4 another thread can pass the entry unobserved.
//! Breakpoints are process-global. The handler stays installed after
//! `detach_all`, since a listener may detach while a single-step is pending.

use super::bindings::kernel32;
use crate::core::types::{Address, ProbeError, ProbeResult};
use crate::host::{EntryContext, EntryListener, Interceptor, RegisterValue, MAX_ARGUMENT_SLOTS};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};
use winapi::shared::ntdef::LONG;
use winapi::um::errhandlingapi::AddVectoredExceptionHandler;
use winapi::um::winnt::{CONTEXT, EXCEPTION_POINTERS};

const INT3: u8 = 0xCC;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
const TRAP_FLAG: u32 = 0x100;

const STATUS_BREAKPOINT: u32 = 0x8000_0003;
const STATUS_SINGLE_STEP: u32 = 0x8000_0004;
const EXCEPTION_CONTINUE_EXECUTION: LONG = -1;
const EXCEPTION_CONTINUE_SEARCH: LONG = 0;

struct Breakpoint {
    original: u8,
    listeners: Vec<Arc<dyn EntryListener>>,
}

#[derive(Default)]
struct Registry {
    handler: usize,
    breakpoints: HashMap<usize, Breakpoint>,
}

lazy_static::lazy_static! {
    static ref REGISTRY: Mutex<Registry> = Mutex::new(Registry::default());
}

thread_local! {
    static PENDING_REARM: Cell<Option<usize>> = const { Cell::new(None) };
}

fn registry() -> MutexGuard<'static, Registry> {
    match REGISTRY.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Handle to the process-wide breakpoint table
#[derive(Debug, Default, Clone, Copy)]
pub struct BreakpointInterceptor;

impl BreakpointInterceptor {
    pub fn new() -> Self {
        BreakpointInterceptor
    }
}

impl Interceptor for BreakpointInterceptor {
    fn attach(&self, target: Address, listener: Arc<dyn EntryListener>) -> ProbeResult<()> {
        if !cfg!(any(target_arch = "x86", target_arch = "x86_64")) {
            return Err(ProbeError::UnsupportedOperation(
                "software breakpoints need an x86 target".to_string(),
            ));
        }

        let executable = kernel32::virtual_query(target.as_usize())
            .and_then(|info| info.protection())
            .map_or(false, |protection| protection.execute);
        if !executable {
            return Err(ProbeError::intercept_failed(target, "not executable memory"));
        }

        let mut registry = registry();
        if registry.handler == 0 {
            let handler = unsafe { AddVectoredExceptionHandler(1, Some(on_exception)) };
            if handler.is_null() {
                return Err(ProbeError::intercept_failed(
                    target,
                    "AddVectoredExceptionHandler failed",
                ));
            }
            registry.handler = handler as usize;
        }

        if let Some(breakpoint) = registry.breakpoints.get_mut(&target.as_usize()) {
            breakpoint.listeners.push(listener);
            return Ok(());
        }

        // SAFETY: the target is executable and is treated as a function entry
        let original = unsafe { kernel32::patch_code_byte(target.as_usize(), INT3)? };
        registry.breakpoints.insert(
            target.as_usize(),
            Breakpoint {
                original,
                listeners: vec![listener],
            },
        );
        debug!("breakpoint set at {} (original byte {:02X})", target, original);
        Ok(())
    }

    fn detach_all(&self) {
        let mut registry = registry();
        for (address, breakpoint) in registry.breakpoints.drain() {
            // SAFETY: restores the byte this table wrote over
            if let Err(err) = unsafe { kernel32::patch_code_byte(address, breakpoint.original) } {
                warn!("failed to restore 0x{:X}: {}", address, err);
            }
        }
    }

    fn active_probes(&self) -> usize {
        registry().breakpoints.len()
    }
}

unsafe extern "system" fn on_exception(info: *mut EXCEPTION_POINTERS) -> LONG {
    let (record, context) = match info.as_ref() {
        Some(info) if !info.ExceptionRecord.is_null() && !info.ContextRecord.is_null() => {
            (&*info.ExceptionRecord, &mut *info.ContextRecord)
        }
        _ => return EXCEPTION_CONTINUE_SEARCH,
    };

    match record.ExceptionCode {
        STATUS_BREAKPOINT => on_breakpoint(record.ExceptionAddress as usize, context),
        STATUS_SINGLE_STEP => on_single_step(),
        _ => EXCEPTION_CONTINUE_SEARCH,
    }
}

unsafe fn on_breakpoint(address: usize, context: &mut CONTEXT) -> LONG {
    let listeners = {
        let registry = registry();
        let Some(breakpoint) = registry.breakpoints.get(&address) else {
            return EXCEPTION_CONTINUE_SEARCH;
        };
        if kernel32::patch_code_byte(address, breakpoint.original).is_err() {
            return EXCEPTION_CONTINUE_SEARCH;
        }
        breakpoint.listeners.clone()
    };

    let entry = capture(address, context);
    for listener in &listeners {
        listener.on_enter(&entry);
    }

    set_instruction_pointer(context, address);
    set_trap_flag(context);
    PENDING_REARM.with(|pending| pending.set(Some(address)));
    EXCEPTION_CONTINUE_EXECUTION
}

unsafe fn on_single_step() -> LONG {
    let Some(address) = PENDING_REARM.with(|pending| pending.take()) else {
        return EXCEPTION_CONTINUE_SEARCH;
    };

    // A detach in between leaves the original byte in place
    if registry().breakpoints.contains_key(&address) {
        let _ = kernel32::patch_code_byte(address, INT3);
    }
    EXCEPTION_CONTINUE_EXECUTION
}

fn stack_slot(stack: usize, index: usize) -> usize {
    let slot = stack + index * std::mem::size_of::<usize>();
    // SAFETY: slots above the stack pointer at a call boundary belong to live frames
    unsafe { std::ptr::read_unaligned(slot as *const usize) }
}

#[cfg(target_arch = "x86")]
fn capture(address: usize, context: &CONTEXT) -> EntryContext {
    // [esp] holds the return address; stack arguments start above it
    let esp = context.Esp as usize;
    EntryContext {
        function: Address::new(address),
        thread_id: kernel32::current_thread_id(),
        arguments: (1..=MAX_ARGUMENT_SLOTS).map(|i| stack_slot(esp, i)).collect(),
        receiver: RegisterValue {
            name: "ecx",
            value: context.Ecx as usize,
        },
    }
}

#[cfg(target_arch = "x86_64")]
fn capture(address: usize, context: &CONTEXT) -> EntryContext {
    let rsp = context.Rsp as usize;
    let registers = [context.Rcx, context.Rdx, context.R8, context.R9];
    // Return address plus 32 bytes of home space precede the fifth argument
    let arguments = registers
        .iter()
        .map(|&value| value as usize)
        .chain((5..).map(|i| stack_slot(rsp, i)))
        .take(MAX_ARGUMENT_SLOTS)
        .collect();

    EntryContext {
        function: Address::new(address),
        thread_id: kernel32::current_thread_id(),
        arguments,
        receiver: RegisterValue {
            name: "rcx",
            value: context.Rcx as usize,
        },
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn capture(address: usize, _context: &CONTEXT) -> EntryContext {
    EntryContext {
        function: Address::new(address),
        thread_id: kernel32::current_thread_id(),
        arguments: Vec::new(),
        receiver: RegisterValue { name: "", value: 0 },
    }
}

#[cfg(target_arch = "x86")]
fn set_instruction_pointer(context: &mut CONTEXT, address: usize) {
    context.Eip = address as u32;
}

#[cfg(target_arch = "x86_64")]
fn set_instruction_pointer(context: &mut CONTEXT, address: usize) {
    context.Rip = address as u64;
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn set_instruction_pointer(_context: &mut CONTEXT, _address: usize) {}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
fn set_trap_flag(context: &mut CONTEXT) {
    context.EFlags |= TRAP_FLAG;
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
fn set_trap_flag(_context: &mut CONTEXT) {}

#[cfg(all(test, any(target_arch = "x86", target_arch = "x86_64")))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        hits: AtomicUsize,
    }

    impl EntryListener for Counter {
        fn on_enter(&self, _context: &EntryContext) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[inline(never)]
    extern "C" fn traced(a: usize, b: usize) -> usize {
        a.wrapping_mul(31).wrapping_add(b)
    }

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_breakpoint_observes_and_rearms() {
        let interceptor = BreakpointInterceptor::new();
        let listener = Arc::new(Counter::default());
        let target = Address::new(traced as usize);
        let call: extern "C" fn(usize, usize) -> usize = std::hint::black_box(traced);

        interceptor.attach(target, listener.clone()).unwrap();
        assert_eq!(interceptor.active_probes(), 1);

        assert_eq!(call(2, 3), 65);
        assert_eq!(call(1, 1), 32);
        assert_eq!(listener.hits.load(Ordering::SeqCst), 2);

        interceptor.detach_all();
        assert_eq!(interceptor.active_probes(), 0);
        assert_eq!(call(0, 7), 7);
        assert_eq!(listener.hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_single_step_setup() {
        let mut context: CONTEXT = unsafe { std::mem::zeroed() };
        set_instruction_pointer(&mut context, 0x1234);
        set_trap_flag(&mut context);

        assert_eq!(context.EFlags & TRAP_FLAG, TRAP_FLAG);
        #[cfg(target_arch = "x86_64")]
        assert_eq!(context.Rip, 0x1234);
        #[cfg(target_arch = "x86")]
        assert_eq!(context.Eip, 0x1234);
    }

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_attach_to_data_is_rejected() {
        let data = [0u8; 16];
        let result = BreakpointInterceptor::new().attach(
            Address::new(data.as_ptr() as usize),
            Arc::new(Counter::default()),
        );
        assert!(matches!(result, Err(ProbeError::InterceptFailed { .. })));
    }
}
