//! Win32 bindings used by the in-process host

pub mod kernel32;
pub mod psapi;
