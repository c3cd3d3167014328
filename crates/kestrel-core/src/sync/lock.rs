//! Reentrant engine locks with ownership queries.

use std::sync::{Condvar, Mutex};

use tracing::warn;

use crate::platform;
use crate::types::OsThreadId;

#[derive(Debug)]
struct LockState
{
    owner: Option<OsThreadId>,
    depth: u32,
}

/// Reentrant lock with explicit acquire/release and an ownership query
///
/// The debugger and thread-store locks outlive any single scope: the
/// helper thread takes them in one loop iteration and releases them in a
/// later one once the debuggee resumes. That rules out guard-based
/// locking, so this is a plain acquire/release pair, reentrant for the
/// owning thread, with [`held_by_current_thread`] available for the
/// lock-discipline assertions sprinkled through the engine.
///
/// [`held_by_current_thread`]: DebuggerLock::held_by_current_thread
#[derive(Debug)]
pub struct DebuggerLock
{
    name: &'static str,
    state: Mutex<LockState>,
    cond: Condvar,
}

impl DebuggerLock
{
    pub fn new(name: &'static str) -> Self
    {
        DebuggerLock {
            name,
            state: Mutex::new(LockState {
                owner: None,
                depth: 0,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn name(&self) -> &'static str
    {
        self.name
    }

    /// Take the lock, blocking until available. Reentrant: the owner may
    /// acquire again and must release once per acquire.
    pub fn acquire(&self)
    {
        let me = platform::current_thread_id();
        let mut state = self.state.lock().unwrap();
        if state.owner == Some(me) {
            state.depth += 1;
            return;
        }
        while state.owner.is_some() {
            state = self.cond.wait(state).unwrap();
        }
        state.owner = Some(me);
        state.depth = 1;
    }

    /// Drop one level of ownership; the lock is free again when the
    /// outermost acquire is released.
    pub fn release(&self)
    {
        let me = platform::current_thread_id();
        let mut state = self.state.lock().unwrap();
        debug_assert_eq!(
            state.owner,
            Some(me),
            "{} released by a non-owning thread",
            self.name
        );
        if state.owner != Some(me) {
            warn!(lock = self.name, "release by non-owner ignored");
            return;
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            drop(state);
            self.cond.notify_one();
        }
    }

    pub fn held_by_current_thread(&self) -> bool
    {
        self.state.lock().unwrap().owner == Some(platform::current_thread_id())
    }
}

#[cfg(test)]
mod tests
{
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_reentrant_acquire()
    {
        let lock = DebuggerLock::new("test");
        lock.acquire();
        lock.acquire();
        assert!(lock.held_by_current_thread());
        lock.release();
        // Still held: one release per acquire.
        assert!(lock.held_by_current_thread());
        lock.release();
        assert!(!lock.held_by_current_thread());
    }

    #[test]
    fn test_cross_thread_exclusion()
    {
        let lock = Arc::new(DebuggerLock::new("test"));
        lock.acquire();

        let contender = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.acquire();
                let held = lock.held_by_current_thread();
                lock.release();
                held
            })
        };

        assert!(!contender.is_finished() || lock.held_by_current_thread());
        lock.release();
        assert!(contender.join().unwrap());
        assert!(!lock.held_by_current_thread());
    }
}
