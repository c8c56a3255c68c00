//! Interception harness
//!
//! Observation-only entry probe with an invocation budget. Entry callbacks
//! may run on any target thread at once; the counter is atomic and the
//! Attached → Detached transition is a compare-exchange, so exactly one
//! callback performs the detach.
//!
//! Detaching calls [`Interceptor::detach_all`], which removes every probe
//! in the host and not only this one.

use crate::core::types::{Address, ProbeError, ProbeResult};
use crate::host::{EntryContext, EntryListener, Interceptor};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum HarnessState {
    Idle = 0,
    Attached = 1,
    Detached = 2,
}

impl HarnessState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => HarnessState::Idle,
            1 => HarnessState::Attached,
            _ => HarnessState::Detached,
        }
    }
}

/// One logged entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryRecord {
    pub sequence: usize,
    pub function: Address,
    pub thread_id: u32,
    pub arguments: Vec<Address>,
    pub receiver_register: &'static str,
    pub receiver: Address,
}

pub struct InterceptionHarness {
    interceptor: Arc<dyn Interceptor>,
    budget: usize,
    captured_arguments: usize,
    observed: AtomicUsize,
    state: AtomicU8,
    entries: Mutex<Vec<EntryRecord>>,
    detached: Condvar,
}

impl InterceptionHarness {
    pub fn new(
        interceptor: Arc<dyn Interceptor>,
        budget: usize,
        captured_arguments: usize,
    ) -> Arc<Self> {
        Arc::new(InterceptionHarness {
            interceptor,
            budget,
            captured_arguments,
            observed: AtomicUsize::new(0),
            state: AtomicU8::new(HarnessState::Idle as u8),
            entries: Mutex::new(Vec::new()),
            detached: Condvar::new(),
        })
    }

    /// Install the entry probe. A harness attaches once.
    pub fn attach(self: &Arc<Self>, target: Address) -> ProbeResult<()> {
        self.state
            .compare_exchange(
                HarnessState::Idle as u8,
                HarnessState::Attached as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|current| {
                ProbeError::intercept_failed(
                    target,
                    format!("harness is {:?}", HarnessState::from_u8(current)),
                )
            })?;

        let listener = Arc::new(HarnessListener {
            harness: Arc::downgrade(self),
        });
        if let Err(err) = self.interceptor.attach(target, listener) {
            self.state.store(HarnessState::Idle as u8, Ordering::Release);
            return Err(err);
        }

        info!("harness attached at {}, budget {} entries", target, self.budget);
        Ok(())
    }

    pub fn state(&self) -> HarnessState {
        HarnessState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Entries counted while attached, including the one that exceeded the budget
    pub fn observed(&self) -> usize {
        self.observed.load(Ordering::Acquire)
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Every entry logged while attached
    pub fn entries(&self) -> Vec<EntryRecord> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Block until the harness has detached. `None` waits without limit.
    /// Returns whether the harness is detached.
    pub fn wait_detached(&self, timeout: Option<Duration>) -> bool {
        let Ok(guard) = self.entries.lock() else {
            return self.state() == HarnessState::Detached;
        };
        let not_detached = |_: &mut Vec<EntryRecord>| self.state() != HarnessState::Detached;

        match timeout {
            Some(limit) => drop(self.detached.wait_timeout_while(guard, limit, not_detached)),
            None => drop(self.detached.wait_while(guard, not_detached)),
        }
        self.state() == HarnessState::Detached
    }

    fn on_entry(&self, context: &EntryContext) {
        if self.state() != HarnessState::Attached {
            return;
        }

        let sequence = self.observed.fetch_add(1, Ordering::AcqRel) + 1;
        let record = EntryRecord {
            sequence,
            function: context.function,
            thread_id: context.thread_id,
            arguments: context
                .arguments
                .iter()
                .take(self.captured_arguments)
                .map(|&value| Address::new(value))
                .collect(),
            receiver_register: context.receiver.name,
            receiver: Address::new(context.receiver.value),
        };

        let arguments: Vec<String> = record.arguments.iter().map(|a| a.to_string()).collect();
        info!(
            "entry #{} at {} on thread {}: args [{}] {}={}",
            sequence,
            record.function,
            record.thread_id,
            arguments.join(", "),
            record.receiver_register,
            record.receiver
        );

        if let Ok(mut entries) = self.entries.lock() {
            entries.push(record);
        }

        if sequence > self.budget {
            self.detach();
        }
    }

    fn detach(&self) {
        let won = self
            .state
            .compare_exchange(
                HarnessState::Attached as u8,
                HarnessState::Detached as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !won {
            return;
        }

        info!("invocation budget of {} exceeded, detaching all probes", self.budget);
        self.interceptor.detach_all();

        // Take the lock so a waiter cannot miss the wakeup between its check and its wait
        let _guard = self.entries.lock();
        self.detached.notify_all();
    }
}

impl Drop for InterceptionHarness {
    fn drop(&mut self) {
        if self.state() == HarnessState::Attached {
            debug!("harness dropped while attached, detaching all probes");
            self.interceptor.detach_all();
        }
    }
}

impl std::fmt::Debug for InterceptionHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptionHarness")
            .field("budget", &self.budget)
            .field("observed", &self.observed())
            .field("state", &self.state())
            .finish()
    }
}

/// Registered with the interceptor; does not keep the harness alive
struct HarnessListener {
    harness: Weak<InterceptionHarness>,
}

impl EntryListener for HarnessListener {
    fn on_enter(&self, context: &EntryContext) {
        if let Some(harness) = self.harness.upgrade() {
            harness.on_entry(context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Protection;
    use crate::host::mock::MockHost;

    const TARGET: usize = 0x5000_0000;

    fn setup(budget: usize) -> (Arc<MockHost>, Arc<InterceptionHarness>) {
        let host = Arc::new(MockHost::new(4));
        host.map_region(TARGET, 0x100, Protection::READ_EXECUTE);
        let harness = InterceptionHarness::new(host.clone(), budget, 7);
        harness.attach(Address::new(TARGET)).unwrap();
        (host, harness)
    }

    #[test]
    fn test_state_transitions() {
        let (host, harness) = setup(2);
        assert_eq!(harness.state(), HarnessState::Attached);
        assert_eq!(host.active_probes(), 1);

        for _ in 0..3 {
            host.fire_entry(Address::new(TARGET), &[1, 2, 3], 0x2000_0000);
        }
        assert_eq!(harness.state(), HarnessState::Detached);
        assert_eq!(host.detach_all_calls(), 1);
        assert_eq!(host.active_probes(), 0);
    }

    #[test]
    fn test_second_attach_rejected() {
        let (_host, harness) = setup(20);
        let err = harness.attach(Address::new(TARGET)).unwrap_err();
        assert!(matches!(err, ProbeError::InterceptFailed { .. }));
    }

    #[test]
    fn test_failed_attach_returns_to_idle() {
        let host = Arc::new(MockHost::new(4));
        let harness = InterceptionHarness::new(host.clone(), 20, 7);
        assert!(harness.attach(Address::new(0xDEAD_0000)).is_err());
        assert_eq!(harness.state(), HarnessState::Idle);
    }

    #[test]
    fn test_arguments_truncated_to_capture_limit() {
        let (host, harness) = setup(20);
        let arguments: Vec<usize> = (1..=10).collect();
        host.fire_entry(Address::new(TARGET), &arguments, 0x2000_0000);

        let entries = harness.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].arguments.len(), 7);
        assert_eq!(entries[0].receiver_register, "ecx");
        assert_eq!(entries[0].receiver, Address::new(0x2000_0000));
    }

    #[test]
    fn test_wait_detached_times_out_while_attached() {
        let (_host, harness) = setup(20);
        assert!(!harness.wait_detached(Some(Duration::from_millis(10))));
    }

    #[test]
    fn test_dropping_attached_harness_detaches() {
        let (host, harness) = setup(20);
        drop(harness);
        assert_eq!(host.detach_all_calls(), 1);
        assert_eq!(host.fire_entry(Address::new(TARGET), &[], 0), 0);
    }
}
