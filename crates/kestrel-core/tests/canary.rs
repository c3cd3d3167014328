//! Tests for the lock-canary protocol: stuck probes, stale answers, and
//! per-round caching.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use kestrel_core::config::CanaryConfig;
use kestrel_core::ipc::DebuggerControlBlock;
use kestrel_core::platform;
use kestrel_core::HelperCanary;
use kestrel_utils::init_test_logging;

fn quick_config() -> CanaryConfig
{
    CanaryConfig {
        first_wait: Duration::from_millis(10),
        steady_wait: Duration::from_millis(10),
        max_retries: 5,
    }
}

#[test]
fn test_default_probe_answers_helper()
{
    init_test_logging();

    let dcb = Arc::new(DebuggerControlBlock::new());
    dcb.set_helper_thread_id(platform::current_thread_id());

    let canary = HelperCanary::new(CanaryConfig::default(), Arc::clone(&dcb));
    canary.init();

    assert_eq!(canary.thread_id(), dcb.canary_thread_id());
    assert!(canary.are_locks_available());

    canary.shutdown();
}

#[test]
fn test_stuck_canary_and_stale_answers_report_unavailable()
{
    init_test_logging();

    let dcb = Arc::new(DebuggerControlBlock::new());
    dcb.set_helper_thread_id(platform::current_thread_id());

    // The probe blocks until the test feeds it a token, wedging the
    // canary the way a held allocator lock would.
    let (token_tx, token_rx) = mpsc::channel::<()>();
    let token_rx = Mutex::new(token_rx);
    let probe = Arc::new(move || {
        let _ = token_rx.lock().unwrap().recv();
    });

    let canary = HelperCanary::with_probe(quick_config(), Arc::clone(&dcb), probe);
    canary.init();

    // Round one: the probe never returns, so the waits run out.
    assert!(!canary.are_locks_available());
    // Same round, cached answer.
    assert!(!canary.are_locks_available());

    // Free the wedged probe. Its answer carries the old round's stamp and
    // must not satisfy the next request.
    token_tx.send(()).unwrap();
    canary.clear_cache();
    assert!(!canary.are_locks_available());

    // One token releases the probe still stuck from the previous round,
    // the next feeds the fresh request.
    token_tx.send(()).unwrap();
    token_tx.send(()).unwrap();
    canary.clear_cache();
    assert!(canary.are_locks_available());

    canary.shutdown();
}

#[test]
fn test_answers_are_cached_per_round()
{
    init_test_logging();

    let dcb = Arc::new(DebuggerControlBlock::new());
    dcb.set_helper_thread_id(platform::current_thread_id());

    let probes = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&probes);
    let probe = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let canary = HelperCanary::with_probe(quick_config(), Arc::clone(&dcb), probe);
    canary.init();

    assert!(canary.are_locks_available());
    assert_eq!(probes.load(Ordering::SeqCst), 1);

    // Cached round: no new probe.
    assert!(canary.are_locks_available());
    assert_eq!(probes.load(Ordering::SeqCst), 1);

    // A new round asks again.
    canary.clear_cache();
    assert!(canary.are_locks_available());
    assert_eq!(probes.load(Ordering::SeqCst), 2);

    canary.shutdown();
}
