//! Invocation budget behaviour of the interception harness

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use vtable_probe::host::mock::MockHost;
use vtable_probe::host::Interceptor;
use vtable_probe::probe::{HarnessState, InterceptionHarness};
use vtable_probe::{Address, Protection};

const TARGET: Address = Address::new(0x0050_1000);
const BUDGET: usize = 20;

fn attached() -> (Arc<MockHost>, Arc<InterceptionHarness>) {
    let host = Arc::new(MockHost::new(4));
    host.map_region(TARGET.as_usize(), 0x100, Protection::READ_EXECUTE);

    let interceptor: Arc<dyn Interceptor> = host.clone();
    let harness = InterceptionHarness::new(interceptor, BUDGET, 7);
    harness.attach(TARGET).unwrap();
    (host, harness)
}

#[test]
fn test_budget_entries_keep_the_probe() {
    let (host, harness) = attached();
    for i in 0..BUDGET {
        assert_eq!(host.fire_entry(TARGET, &[i, i + 1], 0x2000_0000), 1);
    }

    assert_eq!(harness.observed(), BUDGET);
    assert_eq!(harness.state(), HarnessState::Attached);
    assert_eq!(host.detach_all_calls(), 0);
    assert_eq!(host.active_probes(), 1);
}

#[test]
fn test_entry_past_budget_detaches_once() {
    let (host, harness) = attached();
    for i in 0..=BUDGET {
        host.fire_entry(TARGET, &[i], 0x2000_0000);
    }

    assert_eq!(harness.state(), HarnessState::Detached);
    assert_eq!(harness.observed(), BUDGET + 1);
    assert_eq!(host.detach_all_calls(), 1);
    assert_eq!(host.active_probes(), 0);

    // The entry that crossed the budget is still logged
    let entries = harness.entries();
    assert_eq!(entries.len(), BUDGET + 1);
    assert_eq!(entries.last().map(|e| e.sequence), Some(BUDGET + 1));
}

#[test]
fn test_nothing_is_observed_after_detach() {
    let (host, harness) = attached();
    for _ in 0..=BUDGET {
        host.fire_entry(TARGET, &[], 0);
    }
    for _ in 0..5 {
        assert_eq!(host.fire_entry(TARGET, &[], 0), 0);
    }

    assert_eq!(harness.observed(), BUDGET + 1);
    assert_eq!(host.detach_all_calls(), 1);
}

#[test]
fn test_captured_arguments_are_truncated() {
    let (host, harness) = attached();
    let arguments: Vec<usize> = (1..=16).collect();
    host.fire_entry(TARGET, &arguments, 0x2000_0000);

    let entry = &harness.entries()[0];
    assert_eq!(entry.arguments.len(), 7);
    assert_eq!(entry.arguments[6], Address::new(7));
    assert_eq!(entry.receiver, Address::new(0x2000_0000));
    assert_eq!(entry.function, TARGET);
}

#[test]
fn test_concurrent_entries_detach_exactly_once() {
    let (host, harness) = attached();

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let host = Arc::clone(&host);
            thread::spawn(move || {
                for i in 0..10 {
                    host.fire_entry(TARGET, &[worker, i], 0x2000_0000);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(harness.wait_detached(Some(Duration::from_secs(5))));
    assert_eq!(host.detach_all_calls(), 1);
    assert!(harness.observed() > BUDGET);
    assert!(harness.observed() <= 80);

    let mut sequences: Vec<usize> = harness.entries().iter().map(|e| e.sequence).collect();
    sequences.sort_unstable();
    sequences.dedup();
    assert_eq!(sequences.len(), harness.observed());
}

#[test]
fn test_wait_detached_wakes_on_the_last_entry() {
    let (host, harness) = attached();

    let waiter = {
        let harness = Arc::clone(&harness);
        thread::spawn(move || harness.wait_detached(None))
    };
    for _ in 0..=BUDGET {
        host.fire_entry(TARGET, &[], 0);
    }

    assert!(waiter.join().unwrap());
}

#[test]
fn test_wait_detached_times_out_while_attached() {
    let (_host, harness) = attached();
    assert!(!harness.wait_detached(Some(Duration::from_millis(20))));
    assert_eq!(harness.state(), HarnessState::Attached);
}

#[test]
fn test_second_attach_is_rejected() {
    let (_host, harness) = attached();
    assert!(harness.attach(TARGET).is_err());
}

#[test]
fn test_failed_attach_returns_to_idle() {
    let host = Arc::new(MockHost::new(4));
    let interceptor: Arc<dyn Interceptor> = host.clone();
    let harness = InterceptionHarness::new(interceptor, BUDGET, 7);

    assert!(harness.attach(Address::new(0xDEAD_0000)).is_err());
    assert_eq!(harness.state(), HarnessState::Idle);
}

#[test]
fn test_dropping_an_attached_harness_detaches() {
    let (host, harness) = attached();
    drop(harness);

    assert_eq!(host.detach_all_calls(), 1);
    assert_eq!(host.fire_entry(TARGET, &[], 0), 0);
}
