//! Windows backend
//!
//! Implements the host traits for the process this library is loaded into.
//! All unsafe FFI is contained in `bindings` and `breakpoint`.

pub mod bindings;
mod breakpoint;
#[cfg(not(test))]
mod entry;
mod host;
pub mod types;
pub mod utils;

pub use breakpoint::BreakpointInterceptor;
pub use host::WindowsHost;
