//! Probe report and its renderings

use super::{ExtensionOutcome, VirtualCall};
use crate::config::ReportFormat;
use crate::core::types::{Address, ModuleInfo, ProbeResult, SlotIndex};
use crate::memory::{Attribution, ResolvedChain};
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributedAddress {
    pub label: String,
    pub address: Address,
    pub attribution: Attribution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotReport {
    pub slot: SlotIndex,
    pub target: Address,
    pub attribution: Attribution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarnessReport {
    pub slot: SlotIndex,
    pub target: Address,
    pub budget: usize,
}

/// Everything one probe run observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub build: String,
    pub pointer_size: usize,
    pub main_module: ModuleInfo,
    pub chain: ResolvedChain,
    pub context_head: Address,
    pub flag: i32,
    pub attributions: Vec<AttributedAddress>,
    pub extension: ExtensionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call: Option<VirtualCall>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub slots: Vec<SlotReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harness: Option<HarnessReport>,
}

impl ProbeReport {
    /// The identifier decoded by the virtual call, if one was made
    pub fn identifier(&self) -> Option<u64> {
        self.call.as_ref().map(|call| call.identifier)
    }

    pub fn render(&self, format: ReportFormat) -> ProbeResult<String> {
        match format {
            ReportFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            ReportFormat::Text => Ok(self.to_text()),
        }
    }

    /// One line per observation
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "main module {} base {} ({}, {}-bit pointers)",
            self.main_module.name,
            self.main_module.base_address,
            self.build,
            self.pointer_size * 8
        );
        let _ = writeln!(
            out,
            "context {} head {} flag {} inner {} vtable {}",
            self.chain.context,
            self.context_head,
            self.flag,
            self.chain.inner_context,
            self.chain.vtable.address
        );
        for entry in &self.attributions {
            let _ = writeln!(out, "{} {} -> {}", entry.label, entry.address, entry.attribution);
        }
        match &self.extension {
            ExtensionOutcome::Loaded { module } => {
                let _ = writeln!(out, "extension {} loaded", module);
            }
            ExtensionOutcome::Skipped { flag } => {
                let _ = writeln!(out, "extension skipped (flag {})", flag);
            }
        }
        for slot in &self.slots {
            let _ = writeln!(out, "slot {} -> {} [{}]", slot.slot, slot.target, slot.attribution);
        }
        if let Some(harness) = &self.harness {
            let _ = writeln!(
                out,
                "harness on slot {} at {}, budget {}",
                harness.slot, harness.target, harness.budget
            );
        }
        if let Some(call) = &self.call {
            let _ = writeln!(
                out,
                "slot {} method {} returned {} output {} identifier {}",
                call.slot,
                call.method,
                call.return_value,
                hex::encode(call.output),
                call.identifier
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Protection;
    use crate::memory::VTableView;
    use pretty_assertions::assert_eq;

    fn report() -> ProbeReport {
        ProbeReport {
            build: "test build".to_string(),
            pointer_size: 4,
            main_module: ModuleInfo::new("game.exe", Address::new(0x40_0000), 0x100_0000),
            chain: ResolvedChain {
                module_base: Address::new(0x40_0000),
                context: Address::new(0xBF_7758),
                inner_context: Address::new(0x0200_0000),
                vtable: VTableView::new(Address::new(0x0300_0000), 4),
            },
            context_head: Address::new(0x1234),
            flag: 0,
            attributions: vec![AttributedAddress {
                label: "inner context".to_string(),
                address: Address::new(0x0200_0000),
                attribution: Attribution::Unowned {
                    protection: Protection::READ_WRITE,
                },
            }],
            extension: ExtensionOutcome::Skipped { flag: 0 },
            call: None,
            slots: Vec::new(),
            harness: None,
        }
    }

    #[test]
    fn test_text_rendering() {
        let text = report().to_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "main module game.exe base 0x400000 (test build, 32-bit pointers)",
                "context 0xBF7758 head 0x1234 flag 0 inner 0x2000000 vtable 0x3000000",
                "inner context 0x2000000 -> no module, protection rw-",
                "extension skipped (flag 0)",
            ]
        );
    }

    #[test]
    fn test_json_rendering_omits_empty_sections() {
        let json = report().render(ReportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["flag"], 0);
        assert_eq!(value["extension"]["action"], "skipped");
        assert_eq!(value["attributions"][0]["attribution"]["kind"], "unowned");
        assert!(value.get("call").is_none());
        assert!(value.get("slots").is_none());
        assert_eq!(report().identifier(), None);
    }
}
