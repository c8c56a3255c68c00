//! Kernel32.dll bindings for the current process
//!
//! Every wrapper works on the pseudo-handle of the calling process; the
//! agent never opens another process.

use crate::core::types::{ProbeError, ProbeResult};
use crate::windows::types::MemoryBasicInfo;
use crate::windows::utils::{last_error, string_to_wide};
use std::{mem, ptr};
use winapi::shared::minwindef::{DWORD, FALSE, LPCVOID, LPVOID};
use winapi::um::debugapi::OutputDebugStringW;
use winapi::um::memoryapi::{ReadProcessMemory, VirtualProtect, VirtualQuery};
use winapi::um::processthreadsapi::{FlushInstructionCache, GetCurrentProcess, GetCurrentThreadId};
use winapi::um::winnt::{HANDLE, MEMORY_BASIC_INFORMATION, PAGE_EXECUTE_READWRITE};
use ::windows::core::PCWSTR;
use ::windows::Win32::System::LibraryLoader::LoadLibraryW;

/// Pseudo-handle of the current process; never closed
pub fn current_process() -> HANDLE {
    unsafe { GetCurrentProcess() }
}

pub fn current_thread_id() -> u32 {
    unsafe { GetCurrentThreadId() }
}

/// Read `buffer.len()` bytes at `address`. A partial read is an error.
pub fn read_memory(address: usize, buffer: &mut [u8]) -> ProbeResult<()> {
    let mut bytes_read = 0;

    let result = unsafe {
        ReadProcessMemory(
            current_process(),
            address as LPCVOID,
            buffer.as_mut_ptr() as LPVOID,
            buffer.len(),
            &mut bytes_read,
        )
    };

    if result == FALSE || bytes_read != buffer.len() {
        return Err(ProbeError::read_failed(
            format!("0x{:X}", address),
            last_error("ReadProcessMemory").to_string(),
        ));
    }
    Ok(())
}

/// VirtualQuery on the current process; `None` when the address is outside
/// the user address space
pub fn virtual_query(address: usize) -> Option<MemoryBasicInfo> {
    let mut mbi: MEMORY_BASIC_INFORMATION = unsafe { mem::zeroed() };

    let written = unsafe {
        VirtualQuery(
            address as LPCVOID,
            &mut mbi,
            mem::size_of::<MEMORY_BASIC_INFORMATION>(),
        )
    };

    if written == 0 {
        None
    } else {
        Some(MemoryBasicInfo::from(mbi))
    }
}

/// Overwrite one byte of code and return the byte it replaced
///
/// # Safety
/// `address` must be the first byte of an instruction in mapped code, and no
/// thread may be executing the patched instruction mid-write.
pub unsafe fn patch_code_byte(address: usize, value: u8) -> ProbeResult<u8> {
    let target = address as *mut u8;
    let mut old_protect: DWORD = 0;

    if VirtualProtect(target as LPVOID, 1, PAGE_EXECUTE_READWRITE, &mut old_protect) == FALSE {
        return Err(ProbeError::intercept_failed(
            format!("0x{:X}", address),
            last_error("VirtualProtect").to_string(),
        ));
    }

    let original = ptr::read_volatile(target);
    ptr::write_volatile(target, value);

    let mut restored: DWORD = 0;
    VirtualProtect(target as LPVOID, 1, old_protect, &mut restored);
    FlushInstructionCache(current_process(), target as LPCVOID, 1);

    Ok(original)
}

/// LoadLibraryW into the current process. The module handle is not kept.
pub fn load_library(name: &str) -> ProbeResult<()> {
    let wide = string_to_wide(name);
    unsafe { LoadLibraryW(PCWSTR::from_raw(wide.as_ptr())) }
        .map(|_| ())
        .map_err(|err| ProbeError::extension_load(name, err.to_string()))
}

/// Send `message` to an attached debugger; a no-op when none listens
pub fn debug_output(message: &str) {
    let wide = string_to_wide(message);
    unsafe { OutputDebugStringW(wide.as_ptr()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_read_own_memory() {
        let value: u64 = 0x1122_3344_5566_7788;
        let mut buffer = [0u8; 8];
        read_memory(&value as *const u64 as usize, &mut buffer).unwrap();
        assert_eq!(u64::from_ne_bytes(buffer), value);
    }

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_read_null_fails() {
        let mut buffer = [0u8; 4];
        assert!(read_memory(0, &mut buffer).is_err());
    }

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_query_stack_is_committed() {
        let local = 0u32;
        let info = virtual_query(&local as *const u32 as usize).unwrap();
        assert!(info.is_committed());
        assert!(info.protection().unwrap().is_readable());
    }

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_debug_output_without_debugger() {
        debug_output("vtable-probe: agent failed: configuration rejected\n");
    }

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_load_missing_library() {
        let err = load_library("definitely_missing_extension.dll").unwrap_err();
        assert!(matches!(err, ProbeError::ExtensionLoad { .. }));
    }
}
