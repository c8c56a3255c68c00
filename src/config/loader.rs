//! Configuration loader for vtable-probe
//!
//! Handles loading configuration from TOML files and merging with defaults.

use super::defaults::{self, default_config, DEFAULT_CONFIG_FILE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_layout")]
    pub layout: LayoutConfig,

    #[serde(default = "default_harness")]
    pub harness: HarnessConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,
}

/// Memory layout of the target build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_build")]
    pub build: String,
    /// Image base the context offset was measured against
    #[serde(default = "default_reference_image_base")]
    pub reference_image_base: usize,
    /// Virtual address of the context object in the reference layout
    #[serde(default = "default_context_offset")]
    pub context_offset: usize,
    /// Offset of the inner context pointer inside the context object
    #[serde(default = "default_inner_context_offset")]
    pub inner_context_offset: usize,
    /// Offset of the vtable pointer inside the inner context
    #[serde(default = "default_vtable_offset")]
    pub vtable_offset: usize,
    #[serde(default = "default_flag_offset")]
    pub flag_offset: usize,
    #[serde(default = "default_extension_sentinel")]
    pub extension_sentinel: i32,
    #[serde(default = "default_extension_module")]
    pub extension_module: String,
    /// Byte offset of the identifier method's slot inside the vtable
    #[serde(default = "default_identifier_slot_offset")]
    pub identifier_slot_offset: usize,
    /// Target pointer width; the host's width is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer_size: Option<usize>,
}

impl LayoutConfig {
    /// Context offset relative to the loaded main module
    pub fn module_relative_context(&self) -> Option<usize> {
        self.context_offset.checked_sub(self.reference_image_base)
    }

    /// Slot index of the identifier method for a vtable of `pointer_size`
    /// entries; `None` when the offset does not fall on a slot boundary
    pub fn identifier_slot(&self, pointer_size: usize) -> Option<usize> {
        match pointer_size {
            0 => None,
            size if self.identifier_slot_offset % size == 0 => {
                Some(self.identifier_slot_offset / size)
            }
            _ => None,
        }
    }
}

/// Interception harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_harness_slot")]
    pub slot: usize,
    /// Entries observed before every probe is detached
    #[serde(default = "default_invocation_budget")]
    pub invocation_budget: usize,
    #[serde(default = "default_captured_arguments")]
    pub captured_arguments: usize,
    /// Slots listed by the vtable enumeration in inspection mode
    #[serde(default = "default_enumerate_slots")]
    pub enumerate_slots: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: ReportFormat,
    /// Append log lines to this file instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// How the final probe report is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Configuration loader
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Creates a new configuration loader
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        ConfigLoader {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Path this loader reads from
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Loads configuration from file
    pub fn load(&self) -> Result<Config, ConfigError> {
        if !self.config_path.exists() {
            return Err(ConfigError::FileNotFound(
                self.config_path.display().to_string(),
            ));
        }

        let contents = fs::read_to_string(&self.config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Loads configuration, falling back to defaults only when the file is absent.
    /// A file that exists but does not parse is an error.
    pub fn load_or_default(&self) -> Result<Config, ConfigError> {
        match self.load() {
            Err(ConfigError::FileNotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }
}

/// Loads configuration from the default location
pub fn load_config() -> Result<Config, ConfigError> {
    ConfigLoader::new(DEFAULT_CONFIG_FILE).load_or_default()
}

// Default functions for serde
fn default_layout() -> LayoutConfig {
    default_config().layout
}

fn default_harness() -> HarnessConfig {
    default_config().harness
}

fn default_logging() -> LoggingConfig {
    default_config().logging
}

// Individual field defaults
fn default_build() -> String {
    defaults::BUILD_LABEL.to_string()
}

fn default_reference_image_base() -> usize {
    defaults::REFERENCE_IMAGE_BASE
}

fn default_context_offset() -> usize {
    defaults::CONTEXT_OFFSET
}

fn default_inner_context_offset() -> usize {
    defaults::INNER_CONTEXT_OFFSET
}

fn default_vtable_offset() -> usize {
    defaults::VTABLE_OFFSET
}

fn default_flag_offset() -> usize {
    defaults::FLAG_OFFSET
}

fn default_extension_sentinel() -> i32 {
    defaults::EXTENSION_SENTINEL
}

fn default_extension_module() -> String {
    defaults::EXTENSION_MODULE.to_string()
}

fn default_identifier_slot_offset() -> usize {
    defaults::IDENTIFIER_SLOT_OFFSET
}

fn default_harness_slot() -> usize {
    defaults::HARNESS_SLOT
}

fn default_invocation_budget() -> usize {
    defaults::INVOCATION_BUDGET
}

fn default_captured_arguments() -> usize {
    defaults::CAPTURED_ARGUMENTS
}

fn default_enumerate_slots() -> usize {
    defaults::ENUMERATE_SLOTS
}

fn default_log_level() -> String {
    defaults::LOG_LEVEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        default_config()
    }
}
