//! The probe pipeline
//!
//! - [`Probe::run`]: resolve, attribute, act on the flag, call the identifier slot
//! - [`Probe::inspect`]: resolve, attribute, act on the flag, enumerate the
//!   vtable and attach the interception harness instead of calling
//!
//! Every step either succeeds or aborts the run with the first error.

pub mod extension;
pub mod harness;
pub mod invoker;
pub mod report;

pub use extension::{ExtensionLoader, ExtensionOutcome};
pub use harness::{EntryRecord, HarnessState, InterceptionHarness};
pub use invoker::{VirtualCall, VirtualCallInvoker, IDENTIFIER_BUFFER_SIZE};
pub use report::{AttributedAddress, HarnessReport, ProbeReport, SlotReport};

use crate::config::Config;
use crate::core::types::{Address, ModuleInfo, ProbeError, ProbeResult};
use crate::host::{HostRuntime, Interceptor};
use crate::memory::{AddressResolver, ModuleAttributor, ResolvedChain};
use std::sync::Arc;
use tracing::info;

/// Runs the pipeline against one host
pub struct Probe<H: HostRuntime + 'static> {
    host: Arc<H>,
    config: Config,
}

impl<H: HostRuntime + 'static> Probe<H> {
    pub fn new(host: Arc<H>, config: Config) -> Self {
        Probe { host, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    /// Default path: ends with the identifier call
    pub fn run(&self) -> ProbeResult<ProbeReport> {
        let mut report = self.prepare()?;

        let layout = &self.config.layout;
        let vtable = report.chain.vtable;
        let slot = layout.identifier_slot(vtable.pointer_size).ok_or_else(|| {
            ProbeError::InvalidAddress(format!(
                "identifier slot offset 0x{:X} is not a multiple of {}",
                layout.identifier_slot_offset, vtable.pointer_size
            ))
        })?;

        let invoker = VirtualCallInvoker::new(self.host.as_ref());
        // SAFETY: the layout names a receiver method of the
        // `(this, out) -> pointer` shape at the identifier slot.
        let call = unsafe {
            invoker.invoke_slot(&vtable, slot, report.chain.inner_context)?
        };
        info!(
            "slot {} returned {}, output {} -> identifier {}",
            call.slot,
            call.return_value,
            hex::encode(call.output),
            call.identifier
        );

        report.attributions.push(self.attribute("method", call.method)?);
        report.call = Some(call);
        Ok(report)
    }

    /// Inspection path: enumerates slots and attaches the harness. The
    /// harness only observes while the returned handle is alive.
    pub fn inspect(&self) -> ProbeResult<(ProbeReport, Arc<InterceptionHarness>)> {
        let mut report = self.prepare()?;
        let vtable = report.chain.vtable;
        let harness_config = &self.config.harness;

        for (slot, target) in vtable
            .slots(self.host.as_ref(), harness_config.enumerate_slots)?
            .into_iter()
            .enumerate()
        {
            let attribution = self.attributor().attribute(target)?;
            info!("slot {} -> {} [{}]", slot, target, attribution);
            report.slots.push(SlotReport {
                slot,
                target,
                attribution,
            });
        }

        let target = vtable.read_slot(self.host.as_ref(), harness_config.slot)?;
        report
            .attributions
            .push(self.attribute("harness target", target)?);

        let interceptor: Arc<dyn Interceptor> = self.host.clone();
        let harness = InterceptionHarness::new(
            interceptor,
            harness_config.invocation_budget,
            harness_config.captured_arguments,
        );
        harness.attach(target)?;

        report.harness = Some(HarnessReport {
            slot: harness_config.slot,
            target,
            budget: harness_config.invocation_budget,
        });
        Ok((report, harness))
    }

    /// Steps shared by both paths, up to and including the extension load
    fn prepare(&self) -> ProbeResult<ProbeReport> {
        let layout = &self.config.layout;
        let main_module = self.main_module()?;

        let resolver = AddressResolver::new(self.host.as_ref(), layout)?;
        let chain = resolver.resolve(main_module.base_address)?;
        let context_head = resolver.read_context_head(chain.context)?;
        let flag = resolver.read_flag(chain.context)?;
        info!(
            "context {} head {} flag {} inner {} vtable {}",
            chain.context, context_head, flag, chain.inner_context, chain.vtable.address
        );

        let attributions = self.attribute_chain(&chain)?;

        let extension = ExtensionLoader::new(
            self.host.as_ref(),
            layout.extension_sentinel,
            &layout.extension_module,
        )
        .apply(flag)?;

        Ok(ProbeReport {
            build: layout.build.clone(),
            pointer_size: resolver.pointer_size(),
            main_module,
            chain,
            context_head,
            flag,
            attributions,
            extension,
            call: None,
            slots: Vec::new(),
            harness: None,
        })
    }

    fn main_module(&self) -> ProbeResult<ModuleInfo> {
        let module = self.host.main_module()?;
        info!("main module {} at {}", module.name, module.base_address);
        Ok(module)
    }

    fn attribute_chain(&self, chain: &ResolvedChain) -> ProbeResult<Vec<AttributedAddress>> {
        Ok(vec![
            self.attribute("context", chain.context)?,
            self.attribute("inner context", chain.inner_context)?,
            self.attribute("vtable", chain.vtable.address)?,
        ])
    }

    fn attribute(&self, label: &str, address: Address) -> ProbeResult<AttributedAddress> {
        let attribution = self.attributor().attribute(address)?;
        info!("{} {} -> {}", label, address, attribution);
        Ok(AttributedAddress {
            label: label.to_string(),
            address,
            attribution,
        })
    }

    fn attributor(&self) -> ModuleAttributor<'_, H> {
        ModuleAttributor::new(self.host.as_ref())
    }
}
