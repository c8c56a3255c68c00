//! Default configuration values for vtable-probe
//!
//! Offsets below were measured against the 32-bit build of the target whose
//! networking context lives at VA 0xBF7758 with a preferred image base of
//! 0x400000. A different build needs a different layout file.

use super::loader::{Config, HarnessConfig, LayoutConfig, LoggingConfig, ReportFormat};

/// File consulted by [`super::load_config`]
pub const DEFAULT_CONFIG_FILE: &str = "vtable-probe.toml";

pub const BUILD_LABEL: &str = "x86 reference build";

/// Preferred image base of a 32-bit PE; `context_offset` is relative to it
pub const REFERENCE_IMAGE_BASE: usize = 0x40_0000;
pub const CONTEXT_OFFSET: usize = 0xBF_7758;
pub const INNER_CONTEXT_OFFSET: usize = 0x8;
pub const VTABLE_OFFSET: usize = 0x0;
pub const FLAG_OFFSET: usize = 0x4;
pub const EXTENSION_SENTINEL: i32 = 1;
pub const EXTENSION_MODULE: &str = "p2p_hook.dll";
pub const IDENTIFIER_SLOT_OFFSET: usize = 0x8;

pub const HARNESS_SLOT: usize = 0;
pub const INVOCATION_BUDGET: usize = 20;
pub const CAPTURED_ARGUMENTS: usize = 7;
pub const ENUMERATE_SLOTS: usize = 20;

pub const LOG_LEVEL: &str = "info";

/// Returns the default configuration
pub fn default_config() -> Config {
    Config {
        layout: LayoutConfig {
            build: BUILD_LABEL.to_string(),
            reference_image_base: REFERENCE_IMAGE_BASE,
            context_offset: CONTEXT_OFFSET,
            inner_context_offset: INNER_CONTEXT_OFFSET,
            vtable_offset: VTABLE_OFFSET,
            flag_offset: FLAG_OFFSET,
            extension_sentinel: EXTENSION_SENTINEL,
            extension_module: EXTENSION_MODULE.to_string(),
            identifier_slot_offset: IDENTIFIER_SLOT_OFFSET,
            pointer_size: None,
        },
        harness: HarnessConfig {
            enabled: false,
            slot: HARNESS_SLOT,
            invocation_budget: INVOCATION_BUDGET,
            captured_arguments: CAPTURED_ARGUMENTS,
            enumerate_slots: ENUMERATE_SLOTS,
        },
        logging: LoggingConfig {
            level: LOG_LEVEL.to_string(),
            format: ReportFormat::Text,
            file: None,
        },
    }
}
