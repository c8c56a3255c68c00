//! Win32 structure wrappers

pub mod memory_info;

pub use memory_info::MemoryBasicInfo;
