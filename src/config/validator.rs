//! Configuration validator for vtable-probe
//!
//! Rejects layouts that cannot describe any build: the resolved addresses
//! are never shape-checked later, so this is the only gate.

use super::loader::{Config, ConfigError, HarnessConfig, LayoutConfig, LoggingConfig};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the entire configuration
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        Self::validate_layout(&config.layout)?;
        Self::validate_harness(&config.harness)?;
        Self::validate_logging(&config.logging)?;
        Ok(())
    }

    fn validate_layout(layout: &LayoutConfig) -> Result<(), ConfigError> {
        if layout.module_relative_context().is_none() {
            return Err(ConfigError::Invalid(format!(
                "Context offset 0x{:X} lies below the reference image base 0x{:X}",
                layout.context_offset, layout.reference_image_base
            )));
        }

        if let Some(size) = layout.pointer_size {
            if size != 4 && size != 8 {
                return Err(ConfigError::Invalid(format!(
                    "Pointer size must be 4 or 8, got {}",
                    size
                )));
            }
        }

        if layout.identifier_slot_offset % 4 != 0
            || layout
                .pointer_size
                .is_some_and(|size| layout.identifier_slot(size).is_none())
        {
            return Err(ConfigError::Invalid(format!(
                "Identifier slot offset 0x{:X} is not on a slot boundary",
                layout.identifier_slot_offset
            )));
        }

        if layout.extension_module.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "Extension module name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_harness(harness: &HarnessConfig) -> Result<(), ConfigError> {
        if harness.invocation_budget == 0 {
            return Err(ConfigError::Invalid(
                "Invocation budget must be at least 1".to_string(),
            ));
        }

        if harness.captured_arguments == 0 || harness.captured_arguments > 16 {
            return Err(ConfigError::Invalid(
                "Captured arguments must be between 1 and 16".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                logging.level, valid_levels
            )));
        }

        Ok(())
    }
}

/// Validates a configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    ConfigValidator::validate(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_context_below_image_base() {
        let mut config = Config::default();
        config.layout.context_offset = 0x1000;
        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("image base"));
    }

    #[test]
    fn test_invalid_pointer_size() {
        let mut config = Config::default();
        config.layout.pointer_size = Some(2);
        assert!(validate_config(&config).is_err());

        config.layout.pointer_size = Some(4);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_misaligned_identifier_slot() {
        let mut config = Config::default();
        config.layout.identifier_slot_offset = 6;
        assert!(validate_config(&config).is_err());

        config.layout.identifier_slot_offset = 4;
        config.layout.pointer_size = Some(8);
        assert!(validate_config(&config).is_err());

        config.layout.pointer_size = Some(4);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_extension_module() {
        let mut config = Config::default();
        config.layout.extension_module = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_harness_limits() {
        let mut config = Config::default();
        config.harness.invocation_budget = 0;
        assert!(validate_config(&config).is_err());

        config.harness.invocation_budget = 1;
        config.harness.captured_arguments = 17;
        assert!(validate_config(&config).is_err());

        config.harness.captured_arguments = 16;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("log level"));
    }
}
