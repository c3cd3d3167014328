//! # Runtime Controller and Helper Thread
//!
//! The controller owns the debugger's dedicated helper thread, the lock
//! canary, and the signaling surface that feeds the helper's main loop.
//!
//! ## Helper singleton
//!
//! Any number of controller instances may share one control block, but
//! only one real helper thread can ever claim it: the claim is a
//! compare-exchange on the shared helper-id slot, and a candidate that
//! finds the slot taken backs out without entering the loop.
//!
//! ## Main loop
//!
//! One multi-wait over a fixed signal set: control pings, inbound IPC
//! events, favor requests, and (once attached) the controlling debugger
//! process's exit. The wait timeout doubles as the suspension poll: while
//! the debugger is synchronizing the loop wakes every poll interval and
//! sweeps the thread store until every thread parks at a safe point, at
//! which point it keeps both process-wide locks and waits for the
//! Continue that releases them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::canary::HelperCanary;
use crate::config::{CanaryConfig, HelperLoopConfig};
use crate::debugger::DebuggerDelegate;
use crate::error::{EngineError, EngineResult};
use crate::ipc::{DebuggerControlBlock, DebuggerIpcEvent, DebuggerTransport};
use crate::platform;
use crate::sync::{ManualResetEvent, SignalSet, SlotMode, WaitOutcome};

// Wait-set slots, in tie-break priority order.
const SLOT_CONTROL: usize = 0;
const SLOT_EVENT_AVAILABLE: usize = 1;
const SLOT_FAVOR_AVAILABLE: usize = 2;
const SLOT_DEBUGGER_PROCESS_EXIT: usize = 3;

/// Slots waited on before a debugger process is attached.
const WAIT_COUNT_INITIAL: usize = 3;
/// Slots waited on once the debugger process's exit can be observed.
const WAIT_COUNT_FINAL: usize = 4;

// Favor-side wait slots.
const FAVOR_READ: usize = 0;
const FAVOR_HELPER_EXITED: usize = 1;

/// Where the controller's helper machinery currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState
{
    NotStarted,
    /// An arbitrary thread is doing helper duty until the next Continue.
    TemporaryHelperRunning,
    /// The dedicated helper thread is in its main loop.
    RealHelperRunning,
    /// The helper exited (shutdown, lost claim, or panic).
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HelperMode
{
    Real,
    /// Reduced loop that hands back after the first Continue.
    Temporary,
}

type FavorFn = Box<dyn FnOnce() + Send>;

/// Favor handoff state. One favor is in flight at a time; the serializer
/// holds requesters in line for the slot.
struct FavorState
{
    serializer: Mutex<()>,
    slot: Mutex<Option<FavorFn>>,
    wait: SignalSet,
}

/// Everything the helper thread shares with the controller facade.
struct ControllerShared
{
    dcb: Arc<DebuggerControlBlock>,
    delegate: Arc<dyn DebuggerDelegate>,
    transport: Mutex<Box<dyn DebuggerTransport>>,
    config: HelperLoopConfig,
    signals: SignalSet,
    run: AtomicBool,
    attached_to_process_exit: AtomicBool,
    state: Mutex<ControllerState>,
    /// Gate the real helper passes only while no temporary helper runs.
    helper_can_proceed: ManualResetEvent,
    favor: FavorState,
    canary: HelperCanary,
}

/// Marks the controller stopped and wakes favor requesters however the
/// helper exits, including a panicking delegate callback.
struct HelperExitGuard<'a>(&'a ControllerShared);

impl Drop for HelperExitGuard<'_>
{
    fn drop(&mut self)
    {
        *self.0.state.lock().unwrap() = ControllerState::Stopped;
        self.0.favor.wait.signal(FAVOR_HELPER_EXITED);
    }
}

/// Owner of the helper thread, canary, and IPC signaling
///
/// One per runtime instance. Created with the shared control block and
/// the two seams the engine does not implement itself: the
/// [`DebuggerDelegate`] façade and the [`DebuggerTransport`].
pub struct RuntimeController
{
    shared: Arc<ControllerShared>,
    helper: Mutex<Option<JoinHandle<()>>>,
}

impl RuntimeController
{
    pub fn new(
        dcb: Arc<DebuggerControlBlock>,
        delegate: Arc<dyn DebuggerDelegate>,
        transport: Box<dyn DebuggerTransport>,
        config: HelperLoopConfig,
        canary_config: CanaryConfig,
    ) -> Self
    {
        let canary = HelperCanary::new(canary_config, Arc::clone(&dcb));
        let shared = Arc::new(ControllerShared {
            dcb,
            delegate,
            transport: Mutex::new(transport),
            config,
            signals: SignalSet::new(&[
                SlotMode::AutoReset,
                SlotMode::AutoReset,
                SlotMode::AutoReset,
                SlotMode::ManualReset,
            ]),
            run: AtomicBool::new(true),
            attached_to_process_exit: AtomicBool::new(false),
            state: Mutex::new(ControllerState::NotStarted),
            helper_can_proceed: ManualResetEvent::new(true),
            favor: FavorState {
                serializer: Mutex::new(()),
                slot: Mutex::new(None),
                wait: SignalSet::new(&[SlotMode::AutoReset, SlotMode::ManualReset]),
            },
            canary,
        });
        // Everything observers need is in place; announce the block.
        shared.dcb.publish_initialized();
        RuntimeController {
            shared,
            helper: Mutex::new(None),
        }
    }

    /// Spawn the real helper thread and the canary.
    ///
    /// Idempotent for this controller. The helper's OS id is published in
    /// the control block before the thread does any work, so observers
    /// can recognize it from the moment it exists. If another thread
    /// already claimed the helper role, the spawned candidate backs out
    /// and this returns [`EngineError::HelperAlreadyClaimed`].
    pub fn start(&self) -> EngineResult<()>
    {
        let mut helper = self.helper.lock().unwrap();
        if helper.is_some() {
            debug!("helper thread already started");
            return Ok(());
        }

        self.shared.canary.init();

        let shared = Arc::clone(&self.shared);
        let start_gate = Arc::new(ManualResetEvent::new(false));
        let gate = Arc::clone(&start_gate);
        let (id_tx, id_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("kestrel-helper".into())
            .spawn(move || {
                if id_tx.send(platform::current_thread_id()).is_err() {
                    warn!("helper id receiver vanished before startup");
                }
                gate.wait();
                helper_thread_body(&shared);
            })?;

        let id = match id_rx.recv() {
            Ok(id) => id,
            Err(_) => {
                start_gate.set();
                if handle.join().is_err() {
                    warn!("helper thread panicked during startup");
                }
                return Err(EngineError::ThreadSpawn(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "helper thread exited before reporting its id",
                )));
            }
        };

        // Publish the id before the thread proceeds.
        let claim = self.shared.dcb.try_claim_helper(id);
        start_gate.set();

        match claim {
            Ok(()) => {
                *helper = Some(handle);
                debug!(helper = %id, "helper thread started");
                Ok(())
            }
            Err(existing) => {
                // The candidate discovers the foreign id and backs out on
                // its own; it is not worth blocking on its exit here.
                warn!(%existing, candidate = %id, "helper role already claimed");
                Err(EngineError::HelperAlreadyClaimed { existing })
            }
        }
    }

    pub fn state(&self) -> ControllerState
    {
        *self.shared.state.lock().unwrap()
    }

    /// The lock canary owned by this controller.
    pub fn canary(&self) -> &HelperCanary
    {
        &self.shared.canary
    }

    /// Wake the helper to consume an inbound debugger event.
    pub fn notify_event_available(&self)
    {
        self.shared.signals.signal(SLOT_EVENT_AVAILABLE);
    }

    /// Ping the control slot, triggering a straggler sweep while the
    /// debugger is synchronizing.
    pub fn notify_control(&self)
    {
        self.shared.signals.signal(SLOT_CONTROL);
    }

    /// Widen the helper's wait set to include the controlling debugger
    /// process's exit.
    pub fn attach_remote_process(&self)
    {
        self.shared
            .attached_to_process_exit
            .store(true, Ordering::Release);
        self.shared.signals.signal(SLOT_CONTROL);
    }

    /// The controlling debugger process exited.
    pub fn notify_remote_process_exited(&self)
    {
        self.shared
            .attached_to_process_exit
            .store(true, Ordering::Release);
        self.shared.signals.signal(SLOT_DEBUGGER_PROCESS_EXIT);
        self.shared.signals.signal(SLOT_CONTROL);
    }

    /// Run stack-sensitive work on the helper thread
    ///
    /// If the real helper is confirmed running, the favor is handed over
    /// and this blocks until the helper has run it. If the helper is not
    /// ready, the favor runs synchronously right here with no signaling
    /// at all. If the helper dies mid-handoff, the favor runs here only
    /// when the helper provably never picked it up.
    pub fn do_favor<F>(&self, favor: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = &self.shared;

        if self.state() != ControllerState::RealHelperRunning {
            debug!("helper not ready; running favor on calling thread");
            favor();
            return;
        }

        // One favor in flight at a time, end to end.
        let _serial = shared.favor.serializer.lock().unwrap();

        {
            let mut slot = shared.favor.slot.lock().unwrap();
            debug_assert!(slot.is_none(), "favor slot busy despite serializer");
            *slot = Some(Box::new(favor));
        }
        shared.signals.signal(SLOT_FAVOR_AVAILABLE);

        match shared.favor.wait.wait_first(2, None) {
            WaitOutcome::Signaled(FAVOR_READ) => {
                debug!("favor completed on helper thread");
            }
            _ => {
                // Helper exited. Reclaim the favor if it never took it.
                let reclaimed = shared.favor.slot.lock().unwrap().take();
                match reclaimed {
                    Some(favor) => {
                        warn!("helper exited before taking favor; running it here");
                        favor();
                    }
                    None => {
                        warn!("helper exited while holding a favor; not rerunning it");
                    }
                }
            }
        }
    }

    /// Press the calling thread into helper duty until the next Continue
    ///
    /// The caller must hold both the debugger lock and the thread-store
    /// lock; Continue handling releases them, not this loop. Used when an
    /// event must be serviced before the real helper exists.
    pub fn do_temporary_helper_duty(&self)
    {
        let shared = &self.shared;
        let delegate = shared.delegate.as_ref();
        let me = platform::current_thread_id();

        debug_assert!(
            delegate.debugger_lock().held_by_current_thread(),
            "temporary helper duty requires the debugger lock"
        );
        debug_assert!(
            delegate.thread_store_lock().held_by_current_thread(),
            "temporary helper duty requires the thread-store lock"
        );
        debug_assert!(
            self.state() != ControllerState::RealHelperRunning,
            "temporary helper duty while the real helper is running"
        );

        debug!(thread = %me, "temporary helper duty starting");
        shared.helper_can_proceed.reset();
        shared.dcb.set_temporary_helper_thread_id(Some(me));
        let previous = {
            let mut state = shared.state.lock().unwrap();
            let previous = *state;
            *state = ControllerState::TemporaryHelperRunning;
            previous
        };

        main_loop(shared, HelperMode::Temporary);

        shared.dcb.set_temporary_helper_thread_id(None);
        {
            let mut state = shared.state.lock().unwrap();
            if *state == ControllerState::TemporaryHelperRunning {
                *state = previous;
            }
        }
        shared.helper_can_proceed.set();
        debug!(thread = %me, "temporary helper duty complete");
    }

    /// Tell the helper loop to exit. Fire-and-forget: does not wait for
    /// the loop to actually wind down.
    pub fn async_stop(&self)
    {
        self.shared.run.store(false, Ordering::Release);
        self.shared.signals.signal(SLOT_CONTROL);
    }

    /// Wait for the helper thread to finish, if one was started.
    pub fn join_helper(&self)
    {
        let handle = self.helper.lock().unwrap().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("helper thread panicked");
            }
        }
    }
}

impl Drop for RuntimeController
{
    fn drop(&mut self)
    {
        self.async_stop();
        self.join_helper();
        self.shared.canary.shutdown();
    }
}

/// Body of the real helper thread.
fn helper_thread_body(shared: &ControllerShared)
{
    let delegate = shared.delegate.as_ref();
    let me = platform::current_thread_id();

    let _exit_guard = HelperExitGuard(shared);

    // Claim the helper role under the debugger lock. The id may already
    // be ours: start() publishes it before this thread proceeds.
    delegate.debugger_lock().acquire();
    let claimed = match shared.dcb.try_claim_helper(me) {
        Ok(()) => true,
        Err(existing) if existing == me => true,
        Err(existing) => {
            warn!(claimed_by = %existing, candidate = %me, "helper lost the claim race; backing out");
            false
        }
    };
    if !claimed {
        delegate.debugger_lock().release();
        return;
    }
    shared.dcb.set_real_helper_thread_id(me);
    delegate.debugger_lock().release();

    // A temporary helper may be mid-loop; never run alongside it.
    shared.helper_can_proceed.wait();

    *shared.state.lock().unwrap() = ControllerState::RealHelperRunning;
    debug!(helper = %me, "helper thread entering main loop");
    main_loop(shared, HelperMode::Real);
    debug!(helper = %me, "helper thread exiting");
}

/// The wait-and-dispatch loop shared by the real and temporary helpers.
fn main_loop(shared: &ControllerShared, mode: HelperMode)
{
    let delegate = shared.delegate.as_ref();
    let mut timeout: Option<Duration> = None;
    let mut event_buffer = DebuggerIpcEvent::default();

    while shared.run.load(Ordering::Acquire) {
        let wait_count = if shared.attached_to_process_exit.load(Ordering::Acquire) {
            WAIT_COUNT_FINAL
        } else {
            WAIT_COUNT_INITIAL
        };

        match shared.signals.wait_first(wait_count, timeout) {
            WaitOutcome::Signaled(SLOT_DEBUGGER_PROCESS_EXIT) => {
                error!("controlling debugger process exited; terminating");
                delegate.terminate_process();
                break;
            }

            WaitOutcome::Signaled(SLOT_FAVOR_AVAILABLE) => {
                let favor = shared.favor.slot.lock().unwrap().take();
                match favor {
                    Some(favor) => {
                        debug!("running favor on helper thread");
                        favor();
                        shared.favor.wait.signal(FAVOR_READ);
                    }
                    None => warn!("favor signal with nothing registered"),
                }
            }

            WaitOutcome::Signaled(SLOT_EVENT_AVAILABLE) => {
                // New event, new canary round.
                shared.canary.clear_cache();

                let copied = {
                    let mut transport = shared.transport.lock().unwrap();
                    match transport.copy_next_event(&mut event_buffer) {
                        Ok(()) => {
                            if event_buffer.async_send {
                                // No reply expected; release the sender
                                // before dispatching.
                                transport.acknowledge_event();
                            }
                            true
                        }
                        Err(err) => {
                            error!(error = %err, "failed to copy inbound debugger event");
                            false
                        }
                    }
                };

                if copied {
                    debug!(code = event_buffer.code, "dispatching debugger event");
                    let was_continue = delegate.handle_ipc_event(&event_buffer);
                    if !event_buffer.async_send {
                        shared.transport.lock().unwrap().acknowledge_event();
                    }
                    if was_continue {
                        timeout = None;
                        if mode == HelperMode::Temporary {
                            debug!("temporary helper saw a Continue; handing back");
                            break;
                        }
                    }
                }
            }

            WaitOutcome::Signaled(SLOT_CONTROL) => {
                if delegate.is_synchronizing() {
                    // Sweep now rather than waiting out a full interval.
                    timeout = Some(shared.config.sync_poll_interval);
                    run_suspension_sweep(delegate, &mut timeout);
                }
            }

            WaitOutcome::Signaled(slot) => {
                debug_assert!(false, "signal on unexpected slot {slot}");
            }

            WaitOutcome::TimedOut => {
                run_suspension_sweep(delegate, &mut timeout);
            }
        }
    }
}

/// One pass over the thread store while synchronizing.
///
/// Takes the thread-store lock, then the debugger lock. If every thread
/// has reached a safe point the suspension is complete and both locks
/// stay held for Continue handling to release; otherwise both are
/// released until the next poll.
fn run_suspension_sweep(delegate: &dyn DebuggerDelegate, timeout: &mut Option<Duration>)
{
    delegate.thread_store_lock().acquire();
    delegate.debugger_lock().acquire();

    if delegate.sweep_threads_for_suspension() {
        debug!("all threads at safe points; suspension complete");
        delegate.suspend_complete();
        *timeout = None;
    } else {
        delegate.debugger_lock().release();
        delegate.thread_store_lock().release();
    }
}
