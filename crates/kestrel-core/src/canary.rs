//! # Lock Canary
//!
//! A sacrificial thread that answers one question for the helper thread:
//! can the process-wide locks be taken right now without deadlocking?
//!
//! The helper thread must never block on a lock an arbitrary suspended
//! thread might hold, so instead of trying a lock itself it pings the
//! canary. The canary performs a probe that transitively takes the
//! suspect locks (by default a heap allocation) and echoes the request
//! counter back as its answer. If the echo does not arrive within the
//! configured waits, the canary is presumed stuck under a held lock and
//! the answer is "not available."
//!
//! Answers are cached per query round; the helper clears the cache when
//! a new round starts. A canary that could not be spawned degrades the
//! component permanently to "not available," which is safe: the helper
//! falls back to the code paths that do not need the locks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::config::CanaryConfig;
use crate::ipc::DebuggerControlBlock;
use crate::platform;
use crate::sync::{AutoResetEvent, ManualResetEvent};
use crate::types::OsThreadId;

/// Counters shared between the asking thread and the canary thread.
///
/// Requests start at 1 so an answer of 0 always means "no answer yet."
#[derive(Debug, Default)]
struct CanaryCounters
{
    request: AtomicU64,
    answer: AtomicU64,
    stop: AtomicBool,
}

#[derive(Debug, Clone, Copy)]
struct CanaryCache
{
    valid: bool,
    answer: bool,
}

/// Spawn-side state, separated out so the canary can be driven through a
/// shared reference from the controller and the helper thread alike.
#[derive(Default)]
struct CanaryLifecycle
{
    worker: Option<JoinHandle<()>>,
    thread_id: Option<OsThreadId>,
    degraded: bool,
    initialized: bool,
}

/// The canary service owned by the runtime controller.
pub struct HelperCanary
{
    config: CanaryConfig,
    dcb: Arc<DebuggerControlBlock>,
    ping: Arc<AutoResetEvent>,
    wait_event: Arc<ManualResetEvent>,
    counters: Arc<CanaryCounters>,
    cache: Mutex<CanaryCache>,
    probe: Arc<dyn Fn() + Send + Sync>,
    lifecycle: Mutex<CanaryLifecycle>,
}

impl HelperCanary
{
    /// Canary with the default probe: one heap allocation, which takes
    /// the allocator's locks on its way through.
    pub fn new(config: CanaryConfig, dcb: Arc<DebuggerControlBlock>) -> Self
    {
        Self::with_probe(config, dcb, Arc::new(allocation_probe))
    }

    /// Canary with a caller-supplied probe. The probe runs on the canary
    /// thread and should take exactly the locks whose availability is in
    /// question.
    pub fn with_probe(
        config: CanaryConfig,
        dcb: Arc<DebuggerControlBlock>,
        probe: Arc<dyn Fn() + Send + Sync>,
    ) -> Self
    {
        HelperCanary {
            config,
            dcb,
            ping: Arc::new(AutoResetEvent::new(false)),
            wait_event: Arc::new(ManualResetEvent::new(false)),
            counters: Arc::new(CanaryCounters::default()),
            cache: Mutex::new(CanaryCache {
                valid: false,
                answer: false,
            }),
            probe,
            lifecycle: Mutex::new(CanaryLifecycle::default()),
        }
    }

    /// Spawn the canary thread. Idempotent; a second call is a no-op.
    ///
    /// The canary's OS id is recorded in the control block before the
    /// thread probes anything, so other components can recognize it from
    /// the moment it exists. If the spawn fails the canary degrades
    /// permanently and every query answers "not available."
    pub fn init(&self)
    {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        if lifecycle.initialized {
            return;
        }
        lifecycle.initialized = true;

        let ping = Arc::clone(&self.ping);
        let wait_event = Arc::clone(&self.wait_event);
        let counters = Arc::clone(&self.counters);
        let probe = Arc::clone(&self.probe);
        let start_gate = Arc::new(ManualResetEvent::new(false));
        let gate = Arc::clone(&start_gate);
        let (id_tx, id_rx) = mpsc::channel();

        let spawned = thread::Builder::new()
            .name("kestrel-canary".into())
            .spawn(move || {
                // Report our id, then hold until the controller has
                // recorded it. Probing before that would let a query race
                // the id publication.
                if id_tx.send(platform::current_thread_id()).is_err() {
                    warn!("canary id receiver vanished before startup");
                }
                gate.wait();
                canary_thread(&ping, &wait_event, &counters, probe.as_ref());
            });

        match spawned {
            Ok(handle) => match id_rx.recv() {
                Ok(id) => {
                    self.dcb.set_canary_thread_id(id);
                    lifecycle.thread_id = Some(id);
                    lifecycle.worker = Some(handle);
                    start_gate.set();
                    debug!(canary = %id, "canary thread started");
                }
                Err(_) => {
                    // The thread died before reporting in. Unblock it in
                    // case it is somehow still alive, then give up on it.
                    lifecycle.degraded = true;
                    self.counters.stop.store(true, Ordering::Release);
                    start_gate.set();
                    self.ping.set();
                    warn!("canary thread exited before reporting its id");
                }
            },
            Err(error) => {
                lifecycle.degraded = true;
                warn!(%error, "failed to spawn canary thread; locks reported unavailable");
            }
        }
    }

    /// OS id of the canary thread, once spawned.
    pub fn thread_id(&self) -> Option<OsThreadId>
    {
        self.lifecycle.lock().unwrap().thread_id
    }

    /// Can the process-wide locks be taken without blocking forever?
    ///
    /// Threads not doing helper duty always get `true`; they are allowed
    /// to block. For the helper, answers come from the canary protocol
    /// and are cached until [`clear_cache`](HelperCanary::clear_cache).
    /// Before [`init`](HelperCanary::init) or after a failed spawn the
    /// helper's answer is always `false`.
    pub fn are_locks_available(&self) -> bool
    {
        if !self.dcb.is_current_thread_helper() {
            return true;
        }

        let usable = {
            let lifecycle = self.lifecycle.lock().unwrap();
            !lifecycle.degraded && lifecycle.worker.is_some()
        };
        if !usable {
            return false;
        }

        let mut cache = self.cache.lock().unwrap();
        if cache.valid {
            return cache.answer;
        }
        let answer = self.ask_canary();
        *cache = CanaryCache {
            valid: true,
            answer,
        };
        answer
    }

    /// Forget the cached answer; the next query asks the canary again.
    /// Called by the helper at the start of each query round.
    pub fn clear_cache(&self)
    {
        debug_assert!(
            self.dcb.is_current_thread_helper(),
            "only helper-duty threads drive the canary"
        );
        self.cache.lock().unwrap().valid = false;
    }

    /// One full probe round against the canary thread.
    fn ask_canary(&self) -> bool
    {
        let request = self.counters.request.fetch_add(1, Ordering::AcqRel) + 1;
        self.wait_event.reset();
        self.ping.set();
        debug!(request, "pinging canary");

        self.wait_event.wait_timeout(self.config.first_wait);

        let mut retries = 0;
        loop {
            if self.counters.answer.load(Ordering::Acquire) == request {
                return true;
            }
            if retries >= self.config.max_retries {
                warn!(request, "canary unresponsive; reporting locks unavailable");
                return false;
            }
            retries += 1;
            // The event may carry a stale round's signal; reset before
            // waiting so this round blocks for real.
            self.wait_event.reset();
            self.wait_event.wait_timeout(self.config.steady_wait);
        }
    }

    /// Stop and join the canary thread. Idempotent.
    pub fn shutdown(&self)
    {
        let worker = self.lifecycle.lock().unwrap().worker.take();
        if let Some(worker) = worker {
            self.counters.stop.store(true, Ordering::Release);
            self.ping.set();
            if worker.join().is_err() {
                warn!("canary thread panicked during shutdown");
            }
        }
    }
}

impl Drop for HelperCanary
{
    fn drop(&mut self)
    {
        self.shutdown();
    }
}

/// Body of the canary thread.
fn canary_thread(
    ping: &AutoResetEvent,
    wait_event: &ManualResetEvent,
    counters: &CanaryCounters,
    probe: &(dyn Fn() + Send + Sync),
)
{
    debug!("canary thread running");
    loop {
        ping.wait();

        // Answer 0 marks the probe as in flight; the request counter is
        // captured before probing so a late echo never claims a round it
        // did not run for.
        counters.answer.store(0, Ordering::Release);
        let request = counters.request.load(Ordering::Acquire);

        if counters.stop.load(Ordering::Acquire) {
            break;
        }

        probe();

        counters.answer.store(request, Ordering::Release);
        // Latency optimization only; the asker re-polls the counters
        // whether or not it sees this signal.
        wait_event.set();
    }
    debug!("canary thread exiting");
}

/// Default probe: take the allocator's locks by allocating.
fn allocation_probe()
{
    let buffer = vec![0u8; 64];
    std::hint::black_box(buffer);
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_non_helper_threads_skip_the_canary()
    {
        let dcb = Arc::new(DebuggerControlBlock::new());
        let canary = HelperCanary::new(CanaryConfig::default(), dcb);
        // No init, no helper registration: still true for this thread.
        assert!(canary.are_locks_available());
    }

    #[test]
    fn test_uninitialized_canary_answers_unavailable_for_helper()
    {
        let dcb = Arc::new(DebuggerControlBlock::new());
        dcb.set_helper_thread_id(platform::current_thread_id());
        let canary = HelperCanary::new(CanaryConfig::default(), Arc::clone(&dcb));
        assert!(!canary.are_locks_available());
    }

    #[test]
    fn test_init_is_idempotent()
    {
        let dcb = Arc::new(DebuggerControlBlock::new());
        let canary = HelperCanary::new(CanaryConfig::default(), Arc::clone(&dcb));
        canary.init();
        let first_id = canary.thread_id();
        assert!(first_id.is_some());
        canary.init();
        assert_eq!(canary.thread_id(), first_id);
        assert_eq!(dcb.canary_thread_id(), first_id);
        canary.shutdown();
    }
}
