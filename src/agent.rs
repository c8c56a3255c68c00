//! Agent entry
//!
//! Glue between a loaded configuration, a host and the probe pipeline. The
//! Windows build calls [`run_default`] from a thread spawned by `DllMain`.

use crate::config::{validate_config, Config, LoggingConfig};
use crate::host::HostRuntime;
use crate::probe::{InterceptionHarness, Probe, ProbeReport};
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Outcome of one agent run
#[derive(Debug)]
pub struct AgentRun {
    pub report: ProbeReport,
    /// Present in inspection mode; the harness observes while this is held
    pub harness: Option<Arc<InterceptionHarness>>,
}

/// Initialize logging. `RUST_LOG` wins over the configured level.
/// Calling this twice keeps the first subscriber.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid log level {:?}", config.level))?;

    let writer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .try_init();
    Ok(())
}

/// Validate `config` and run the probe against `host`
pub fn run_agent<H: HostRuntime + 'static>(host: Arc<H>, config: Config) -> Result<AgentRun> {
    validate_config(&config).context("configuration rejected")?;
    info!(
        "vtable-probe v{} for {}, context offset 0x{:X}",
        crate::VERSION,
        config.layout.build,
        config.layout.context_offset
    );

    let format = config.logging.format;
    let inspect = config.harness.enabled;
    let probe = Probe::new(host, config);

    let run = if inspect {
        let (report, harness) = probe.inspect().context("inspection failed")?;
        AgentRun {
            report,
            harness: Some(harness),
        }
    } else {
        let report = probe.run().context("probe failed")?;
        AgentRun {
            report,
            harness: None,
        }
    };

    info!("report:\n{}", run.report.render(format)?);
    Ok(run)
}

/// One-line rendering of an agent failure with its whole context chain
pub fn failure_message(err: &anyhow::Error) -> String {
    format!("vtable-probe: agent failed: {:#}\n", err)
}

/// Load `vtable-probe.toml` (or the built-in layout), log, and probe the
/// current process. In inspection mode this blocks until the harness detaches.
#[cfg(windows)]
pub fn run_default() -> Result<()> {
    use crate::windows::WindowsHost;
    use tracing::error;

    let config = crate::config::load_config().context("failed to load configuration")?;
    init_logging(&config.logging)?;

    let host = Arc::new(WindowsHost::new());
    let run = match run_agent(host, config) {
        Ok(run) => run,
        Err(err) => {
            error!("{:#}", err);
            return Err(err);
        }
    };

    if let Some(harness) = run.harness {
        harness.wait_detached(None);
        info!("harness detached after {} entries", harness.observed());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Address, ModuleInfo, Protection};
    use crate::host::mock::MockHost;
    use crate::host::Interceptor;
    use tempfile::TempDir;

    #[test]
    fn test_invalid_config_is_rejected_before_probing() {
        let host = Arc::new(MockHost::new(8));
        let mut config = Config::default();
        config.harness.invocation_budget = 0;

        let err = run_agent(host.clone(), config).unwrap_err();
        assert!(err.to_string().contains("configuration rejected"));
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_missing_main_module_fails_loudly() {
        let host = Arc::new(MockHost::new(8));
        let err = run_agent(host, Config::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("main module"));
    }

    #[test]
    fn test_inspection_mode_returns_harness() {
        let host = Arc::new(MockHost::new(4));
        host.add_module(ModuleInfo::new("game.exe", Address::new(0x40_0000), 0x100_0000));
        host.map_region(0xBF_7758, 0x10, Protection::READ_WRITE);
        host.write_pointer(0xBF_7760, 0x0200_0000);
        host.write_pointer(0x0200_0000, 0x0300_0000);
        host.map_region(0x0300_0000, 0x80, Protection::READ);
        host.write_pointer(0x0300_0000, 0x0050_1000);
        host.map_region(0x0050_1000, 0x10, Protection::READ_EXECUTE);

        let mut config = Config::default();
        config.harness.enabled = true;
        config.harness.enumerate_slots = 4;

        let run = run_agent(host.clone(), config).unwrap();
        assert!(run.report.call.is_none());
        assert_eq!(run.report.slots.len(), 4);
        assert!(run.harness.is_some());
        assert_eq!(host.active_probes(), 1);
    }

    #[test]
    fn test_failure_message_keeps_the_context_chain() {
        let host = Arc::new(MockHost::new(8));
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();

        let err = run_agent(host, config).unwrap_err();
        let message = failure_message(&err);
        assert!(message.starts_with("vtable-probe: agent failed: configuration rejected: "));
        assert!(message.contains("Invalid log level"));
        assert!(message.ends_with('\n'));
    }

    #[test]
    fn test_log_file_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("probe.log");
        let config = LoggingConfig {
            level: "debug".to_string(),
            format: Default::default(),
            file: Some(path.clone()),
        };
        init_logging(&config).unwrap();
        assert!(path.exists());
    }
}
