//! DLL entry point of the injected agent

use super::bindings::kernel32;
use crate::agent::failure_message;
use winapi::shared::minwindef::{BOOL, DWORD, HINSTANCE, LPVOID, TRUE};
use winapi::um::winnt::DLL_PROCESS_ATTACH;

/// Starts the agent on its own thread; DllMain runs under the loader lock.
#[no_mangle]
#[allow(non_snake_case)]
pub extern "system" fn DllMain(_module: HINSTANCE, reason: DWORD, _reserved: LPVOID) -> BOOL {
    if reason == DLL_PROCESS_ATTACH {
        let spawned = std::thread::Builder::new()
            .name("vtable-probe".to_string())
            .spawn(|| {
                // Config and logging failures happen before any subscriber exists
                if let Err(err) = crate::agent::run_default() {
                    report(&failure_message(&err));
                }
            });
        if let Err(err) = spawned {
            report(&format!("vtable-probe: cannot start agent thread: {}\n", err));
        }
    }
    TRUE
}

fn report(message: &str) {
    eprint!("{}", message);
    kernel32::debug_output(message);
}
