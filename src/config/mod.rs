//! Configuration module for vtable-probe
//!
//! The target layout is external, uncontrolled memory structure that only
//! holds for one build of the target binary. It is described here as named
//! fields with compiled-in defaults, optionally overridden from a TOML file
//! and validated once at startup.

mod defaults;
mod loader;
mod validator;

pub use defaults::{default_config, DEFAULT_CONFIG_FILE};
pub use loader::{load_config, ConfigLoader};
pub use validator::{validate_config, ConfigValidator};

// Re-export the configuration structures
pub use loader::{Config, HarnessConfig, LayoutConfig, LoggingConfig, ReportFormat};

// Configuration-related error type
pub use loader::ConfigError;

// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;
