//! Conditional extension loading

use crate::core::types::ProbeResult;
use crate::host::ModuleQuery;
use serde::Serialize;
use tracing::{info, warn};

/// What the loader did with a flag value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ExtensionOutcome {
    Loaded { module: String },
    Skipped { flag: i32 },
}

/// Loads a named module when the context flag equals the sentinel
pub struct ExtensionLoader<'a, Q: ModuleQuery + ?Sized> {
    modules: &'a Q,
    sentinel: i32,
    module: &'a str,
}

impl<'a, Q: ModuleQuery + ?Sized> ExtensionLoader<'a, Q> {
    pub fn new(modules: &'a Q, sentinel: i32, module: &'a str) -> Self {
        ExtensionLoader {
            modules,
            sentinel,
            module,
        }
    }

    pub fn should_load(&self, flag: i32) -> bool {
        flag == self.sentinel
    }

    /// Act once on `flag`. A failed load is returned, never retried.
    pub fn apply(&self, flag: i32) -> ProbeResult<ExtensionOutcome> {
        if !self.should_load(flag) {
            info!("flag {} != {}, extension not loaded", flag, self.sentinel);
            return Ok(ExtensionOutcome::Skipped { flag });
        }

        info!("flag {} matches, loading {}", flag, self.module);
        if let Err(err) = self.modules.load_module(self.module) {
            warn!("extension load failed: {}", err);
            return Err(err);
        }

        Ok(ExtensionOutcome::Loaded {
            module: self.module.to_string(),
        })
    }
}
