//! Register snapshots carried through a stackwalk.

use crate::types::Address;

/// The minimal register view one unwind step exposes
///
/// The underlying walker keeps a full architecture context; the engine only
/// ever needs three values from it, so collaborators project them into this
/// snapshot at every callback:
///
/// - `pc`: the control pc at this step (zero when the walker could not
///   recover one, e.g. across a corrupted transition)
/// - `sp`: the stack pointer at this step
/// - `stack_mark`: the location that identifies this frame for ordering
///   purposes; on funclet architectures this is the establisher-frame
///   address, on x86 it tracks the unwound stack pointer. Frequently equal
///   to `sp`, but the walker is allowed to distinguish them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSnapshot
{
    pub pc: Address,
    pub sp: Address,
    pub stack_mark: Address,
}

impl RegisterSnapshot
{
    /// All-zero snapshot, used for synthesized chain markers that have no
    /// machine context of their own.
    pub const ZEROED: Self = RegisterSnapshot {
        pc: Address::ZERO,
        sp: Address::ZERO,
        stack_mark: Address::ZERO,
    };

    /// Snapshot where every register tracks one stack location.
    pub const fn at(location: Address) -> Self
    {
        RegisterSnapshot {
            pc: location,
            sp: location,
            stack_mark: location,
        }
    }

    /// Did the walker recover a control pc at this step?
    pub const fn has_valid_pc(self) -> bool
    {
        !self.pc.is_zero()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_zeroed_has_no_pc()
    {
        assert!(!RegisterSnapshot::ZEROED.has_valid_pc());
        assert!(RegisterSnapshot::at(Address::new(0x10)).has_valid_pc());
    }

    #[test]
    fn test_zeroed_is_the_all_zero_snapshot()
    {
        assert_eq!(RegisterSnapshot::ZEROED, RegisterSnapshot::at(Address::ZERO));
    }
}
