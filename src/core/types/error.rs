//! Custom error types for vtable-probe

use crate::config::ConfigError;
use std::fmt;
use thiserror::Error;

/// Main error type for probe operations
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Invalid memory address: {0}")]
    InvalidAddress(String),

    #[error("Failed to read memory at {address}: {reason}")]
    ReadFailed { address: String, reason: String },

    #[error("Pointer chain broken at level {level}: {reason}")]
    PointerChainBroken { level: usize, reason: String },

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Failed to load extension module {module}: {reason}")]
    ExtensionLoad { module: String, reason: String },

    #[error("Unsupported call shape: {0}")]
    UnsupportedCallShape(String),

    #[error("Native call failed: {0}")]
    CallFailed(String),

    #[error("Failed to intercept {address}: {reason}")]
    InterceptFailed { address: String, reason: String },

    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Windows API: {0}")]
    WindowsApi(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for probe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

impl ProbeError {
    /// Creates a read failed error
    pub fn read_failed(address: impl fmt::Display, reason: impl Into<String>) -> Self {
        ProbeError::ReadFailed {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a pointer chain broken error
    pub fn pointer_chain_broken(level: usize, reason: impl Into<String>) -> Self {
        ProbeError::PointerChainBroken {
            level,
            reason: reason.into(),
        }
    }

    /// Creates an extension load error
    pub fn extension_load(module: impl Into<String>, reason: impl Into<String>) -> Self {
        ProbeError::ExtensionLoad {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Creates an interception error
    pub fn intercept_failed(address: impl fmt::Display, reason: impl Into<String>) -> Self {
        ProbeError::InterceptFailed {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a buffer too small error
    pub fn buffer_too_small(expected: usize, actual: usize) -> Self {
        ProbeError::BufferTooSmall { expected, actual }
    }

    /// Whether this error came from touching target memory
    pub fn is_memory_access(&self) -> bool {
        matches!(
            self,
            ProbeError::ReadFailed { .. }
                | ProbeError::PointerChainBroken { .. }
                | ProbeError::InvalidAddress(_)
        )
    }
}
