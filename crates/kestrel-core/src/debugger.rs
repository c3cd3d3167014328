//! # Debugger Façade
//!
//! The seam between the helper-thread machinery and the debugger proper.
//! The engine drives suspension and event dispatch; everything that needs
//! knowledge of the actual debuggee (what the events mean, which threads
//! exist, how to stop the process) goes through this trait.

use crate::ipc::DebuggerIpcEvent;
use crate::sync::DebuggerLock;

/// What the helper loop needs from the debugger proper
///
/// Implementations are shared across the helper, temporary-helper, and
/// controller threads, so everything takes `&self`.
///
/// ## Lock discipline
///
/// The two locks exposed here are taken by the helper in a fixed order,
/// thread-store first, then debugger. When a suspension sweep finds every
/// thread at a safe point the helper keeps both locks held across loop
/// iterations; the façade's Continue handling is responsible for
/// releasing them once the debuggee resumes.
pub trait DebuggerDelegate: Send + Sync
{
    /// Handle one inbound debugger event.
    ///
    /// Returns true iff the event was a Continue, meaning the debuggee
    /// resumes and the helper can stop straggler sweeping.
    fn handle_ipc_event(&self, event: &DebuggerIpcEvent) -> bool;

    /// A cooperative suspension just completed: every thread is at a
    /// safe point and the helper holds both locks.
    fn suspend_complete(&self);

    /// Is a cooperative suspension currently in progress?
    fn is_synchronizing(&self) -> bool;

    /// Re-examine all threads for suspension progress. Returns true iff
    /// every thread has reached a safe point. Called with both locks
    /// held.
    fn sweep_threads_for_suspension(&self) -> bool;

    /// The controlling debugger process died; the runtime cannot safely
    /// continue half-debugged. Production implementations terminate the
    /// process and never return; if this does return (tests), the helper
    /// loop exits.
    fn terminate_process(&self);

    /// Process-wide debugger lock.
    fn debugger_lock(&self) -> &DebuggerLock;

    /// Thread-store lock; always acquired before the debugger lock.
    fn thread_store_lock(&self) -> &DebuggerLock;
}
