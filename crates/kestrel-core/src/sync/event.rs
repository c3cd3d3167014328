//! # Reset Events
//!
//! Manual- and auto-reset signaling events built on a mutex/condvar pair.
//!
//! The helper-thread and canary protocols are specified in terms of these
//! two shapes: a manual-reset event stays signaled until somebody resets
//! it, an auto-reset event hands its signal to exactly one waiter and
//! clears itself in the same step.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Event that stays signaled until explicitly reset
///
/// Every waiter blocked in [`wait`](ManualResetEvent::wait) is released
/// while the event is set, and late arrivals pass straight through.
#[derive(Debug)]
pub struct ManualResetEvent
{
    state: Mutex<bool>,
    cond: Condvar,
}

impl ManualResetEvent
{
    pub fn new(initially_set: bool) -> Self
    {
        ManualResetEvent {
            state: Mutex::new(initially_set),
            cond: Condvar::new(),
        }
    }

    /// Signal the event, releasing all current and future waiters.
    pub fn set(&self)
    {
        let mut set = self.state.lock().unwrap();
        *set = true;
        drop(set);
        self.cond.notify_all();
    }

    /// Return the event to the unsignaled state.
    pub fn reset(&self)
    {
        *self.state.lock().unwrap() = false;
    }

    pub fn is_set(&self) -> bool
    {
        *self.state.lock().unwrap()
    }

    /// Block until the event is signaled.
    pub fn wait(&self)
    {
        let mut set = self.state.lock().unwrap();
        while !*set {
            set = self.cond.wait(set).unwrap();
        }
    }

    /// Block until the event is signaled or `timeout` elapses.
    ///
    /// Returns true if the event was observed signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool
    {
        let deadline = Instant::now() + timeout;
        let mut set = self.state.lock().unwrap();
        while !*set {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) => remaining,
                None => return false,
            };
            set = self.cond.wait_timeout(set, remaining).unwrap().0;
        }
        true
    }
}

/// Event that releases exactly one waiter per signal
///
/// A successful wait consumes the signal. Signaling an already-signaled
/// event is idempotent; signals do not accumulate.
#[derive(Debug)]
pub struct AutoResetEvent
{
    state: Mutex<bool>,
    cond: Condvar,
}

impl AutoResetEvent
{
    pub fn new(initially_set: bool) -> Self
    {
        AutoResetEvent {
            state: Mutex::new(initially_set),
            cond: Condvar::new(),
        }
    }

    /// Signal the event, releasing at most one waiter.
    pub fn set(&self)
    {
        let mut set = self.state.lock().unwrap();
        *set = true;
        drop(set);
        self.cond.notify_one();
    }

    /// Block until signaled, consuming the signal.
    pub fn wait(&self)
    {
        let mut set = self.state.lock().unwrap();
        while !*set {
            set = self.cond.wait(set).unwrap();
        }
        *set = false;
    }

    /// Block until signaled or `timeout` elapses.
    ///
    /// Returns true if a signal was consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool
    {
        let deadline = Instant::now() + timeout;
        let mut set = self.state.lock().unwrap();
        while !*set {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) => remaining,
                None => return false,
            };
            set = self.cond.wait_timeout(set, remaining).unwrap().0;
        }
        *set = false;
        true
    }
}

#[cfg(test)]
mod tests
{
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_manual_reset_releases_all_waiters()
    {
        let event = Arc::new(ManualResetEvent::new(false));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let event = Arc::clone(&event);
            handles.push(thread::spawn(move || event.wait()));
        }
        event.set();
        for handle in handles {
            handle.join().unwrap();
        }
        // Still set afterwards; late waiters pass through.
        assert!(event.is_set());
        assert!(event.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_auto_reset_consumes_signal()
    {
        let event = AutoResetEvent::new(true);
        assert!(event.wait_timeout(Duration::from_millis(1)));
        // Consumed: a second wait times out.
        assert!(!event.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_wait_timeout_expires()
    {
        let event = ManualResetEvent::new(false);
        assert!(!event.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn test_reset_blocks_new_waiters()
    {
        let event = ManualResetEvent::new(true);
        event.reset();
        assert!(!event.is_set());
        assert!(!event.wait_timeout(Duration::from_millis(1)));
    }
}
