//! PSAPI.dll bindings for module enumeration

use crate::core::types::{Address, ModuleInfo, ProbeError, ProbeResult};
use crate::windows::utils::{last_error, wide_to_string};
use std::ptr;
use winapi::shared::minwindef::{FALSE, HMODULE, MAX_PATH};
use winapi::um::libloaderapi::GetModuleHandleW;
use winapi::um::psapi::{EnumProcessModules, GetModuleBaseNameW, GetModuleInformation, MODULEINFO};

use super::kernel32::current_process;

/// Handles of every module loaded in the current process
pub fn enum_process_modules() -> ProbeResult<Vec<HMODULE>> {
    let mut modules: Vec<HMODULE> = vec![ptr::null_mut(); 1024];
    let mut bytes_needed = 0u32;

    loop {
        let result = unsafe {
            EnumProcessModules(
                current_process(),
                modules.as_mut_ptr(),
                (modules.len() * std::mem::size_of::<HMODULE>()) as u32,
                &mut bytes_needed,
            )
        };
        if result == FALSE {
            return Err(last_error("EnumProcessModules"));
        }

        let count = bytes_needed as usize / std::mem::size_of::<HMODULE>();
        if count <= modules.len() {
            modules.truncate(count);
            return Ok(modules);
        }
        modules.resize(count, ptr::null_mut());
    }
}

/// Name, base and image size of `module`
pub fn module_info(module: HMODULE) -> ProbeResult<ModuleInfo> {
    let mut info = MODULEINFO {
        lpBaseOfDll: ptr::null_mut(),
        SizeOfImage: 0,
        EntryPoint: ptr::null_mut(),
    };

    let result = unsafe {
        GetModuleInformation(
            current_process(),
            module,
            &mut info,
            std::mem::size_of::<MODULEINFO>() as u32,
        )
    };
    if result == FALSE {
        return Err(last_error("GetModuleInformation"));
    }

    Ok(ModuleInfo::new(
        module_base_name(module)?,
        Address::new(info.lpBaseOfDll as usize),
        info.SizeOfImage as usize,
    ))
}

/// Handle of the executable image
pub fn main_module_handle() -> ProbeResult<HMODULE> {
    let handle = unsafe { GetModuleHandleW(ptr::null()) };
    if handle.is_null() {
        Err(ProbeError::ModuleNotFound("main module".to_string()))
    } else {
        Ok(handle)
    }
}

fn module_base_name(module: HMODULE) -> ProbeResult<String> {
    let mut buffer = vec![0u16; MAX_PATH];

    let length = unsafe {
        GetModuleBaseNameW(current_process(), module, buffer.as_mut_ptr(), MAX_PATH as u32)
    };
    if length == 0 {
        return Err(last_error("GetModuleBaseNameW"));
    }

    buffer.truncate(length as usize);
    Ok(wide_to_string(&buffer))
}
