//! # Signal Sets
//!
//! A fixed group of signal slots that one thread can wait on as a unit,
//! taking whichever slot fires first. The helper-thread main loop is
//! written against this shape: it waits on its first N slots with an
//! optional timeout and dispatches on the winning index, where lower
//! indices always win ties.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Reset behavior of one slot in a [`SignalSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotMode
{
    /// Consuming the slot's signal clears it.
    AutoReset,
    /// The signal stays up until [`SignalSet::clear`] is called.
    ManualReset,
}

/// Result of one wait round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome
{
    /// The slot at this index fired.
    Signaled(usize),
    TimedOut,
}

/// Group of signal slots waited on together.
#[derive(Debug)]
pub struct SignalSet
{
    bits: Mutex<u32>,
    cond: Condvar,
    modes: Vec<SlotMode>,
}

impl SignalSet
{
    /// Build a set with one slot per entry of `modes`. At most 32 slots.
    pub fn new(modes: &[SlotMode]) -> Self
    {
        debug_assert!(modes.len() <= 32, "signal set is limited to 32 slots");
        SignalSet {
            bits: Mutex::new(0),
            cond: Condvar::new(),
            modes: modes.to_vec(),
        }
    }

    /// Raise the signal on `slot`.
    pub fn signal(&self, slot: usize)
    {
        debug_assert!(slot < self.modes.len());
        let mut bits = self.bits.lock().unwrap();
        *bits |= 1 << slot;
        drop(bits);
        self.cond.notify_all();
    }

    /// Lower the signal on `slot` without consuming it in a wait.
    pub fn clear(&self, slot: usize)
    {
        debug_assert!(slot < self.modes.len());
        *self.bits.lock().unwrap() &= !(1 << slot);
    }

    pub fn is_signaled(&self, slot: usize) -> bool
    {
        debug_assert!(slot < self.modes.len());
        *self.bits.lock().unwrap() & (1 << slot) != 0
    }

    /// Wait until one of the first `count` slots is signaled.
    ///
    /// The lowest signaled index wins. Auto-reset slots are cleared as
    /// part of a successful wait; manual-reset slots stay up. `None`
    /// waits forever.
    pub fn wait_first(&self, count: usize, timeout: Option<Duration>) -> WaitOutcome
    {
        debug_assert!(count > 0 && count <= self.modes.len());
        let mask = if count >= 32 {
            u32::MAX
        } else {
            (1u32 << count) - 1
        };
        let deadline = timeout.map(|t| Instant::now() + t);

        let mut bits = self.bits.lock().unwrap();
        loop {
            let ready = *bits & mask;
            if ready != 0 {
                let slot = ready.trailing_zeros() as usize;
                if self.modes[slot] == SlotMode::AutoReset {
                    *bits &= !(1 << slot);
                }
                return WaitOutcome::Signaled(slot);
            }

            bits = match deadline {
                None => self.cond.wait(bits).unwrap(),
                Some(deadline) => {
                    let remaining = match deadline.checked_duration_since(Instant::now()) {
                        Some(remaining) => remaining,
                        None => return WaitOutcome::TimedOut,
                    };
                    self.cond.wait_timeout(bits, remaining).unwrap().0
                }
            };
        }
    }
}

#[cfg(test)]
mod tests
{
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_lowest_index_wins()
    {
        let set = SignalSet::new(&[SlotMode::AutoReset, SlotMode::AutoReset]);
        set.signal(1);
        set.signal(0);
        assert_eq!(set.wait_first(2, None), WaitOutcome::Signaled(0));
        assert_eq!(set.wait_first(2, None), WaitOutcome::Signaled(1));
    }

    #[test]
    fn test_auto_slots_clear_on_consumption()
    {
        let set = SignalSet::new(&[SlotMode::AutoReset]);
        set.signal(0);
        assert_eq!(set.wait_first(1, None), WaitOutcome::Signaled(0));
        assert!(!set.is_signaled(0));
        assert_eq!(
            set.wait_first(1, Some(Duration::from_millis(1))),
            WaitOutcome::TimedOut
        );
    }

    #[test]
    fn test_manual_slots_stay_signaled()
    {
        let set = SignalSet::new(&[SlotMode::ManualReset]);
        set.signal(0);
        assert_eq!(set.wait_first(1, None), WaitOutcome::Signaled(0));
        assert_eq!(set.wait_first(1, None), WaitOutcome::Signaled(0));
        set.clear(0);
        assert_eq!(
            set.wait_first(1, Some(Duration::from_millis(1))),
            WaitOutcome::TimedOut
        );
    }

    #[test]
    fn test_wait_scope_excludes_higher_slots()
    {
        // Edge case: a signal outside the waited range must not wake the
        // round with a result.
        let set = SignalSet::new(&[SlotMode::AutoReset, SlotMode::ManualReset]);
        set.signal(1);
        assert_eq!(
            set.wait_first(1, Some(Duration::from_millis(1))),
            WaitOutcome::TimedOut
        );
        assert_eq!(set.wait_first(2, None), WaitOutcome::Signaled(1));
    }

    #[test]
    fn test_cross_thread_wakeup()
    {
        let set = Arc::new(SignalSet::new(&[SlotMode::AutoReset]));
        let waiter = {
            let set = Arc::clone(&set);
            thread::spawn(move || set.wait_first(1, None))
        };
        set.signal(0);
        assert_eq!(waiter.join().unwrap(), WaitOutcome::Signaled(0));
    }
}
