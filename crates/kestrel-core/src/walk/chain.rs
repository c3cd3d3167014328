//! Bookkeeping for an in-progress run of unmanaged frames.

use crate::types::{FramePointer, RegisterSnapshot};

/// Tracks one candidate unmanaged chain between managed regions
///
/// Tracking begins when the walk crosses into native code (or meets an
/// exit frame) and accumulates the chain's boundaries: `start_registers`
/// holds the context at the chain's leaf edge, `end` creeps rootward as
/// explicit frames are visited. The driver either dispatches the chain as
/// a single marker record or cancels it when it turns out to bracket
/// nothing worth reporting.
#[derive(Debug)]
pub(crate) struct UnmanagedChainTracker
{
    tracking: bool,
    start_registers: RegisterSnapshot,
    end: FramePointer,
    hit_exit_frame: bool,
}

impl UnmanagedChainTracker
{
    pub(crate) fn new() -> Self
    {
        UnmanagedChainTracker {
            tracking: false,
            start_registers: RegisterSnapshot::ZEROED,
            end: FramePointer::LEAF_MOST,
            hit_exit_frame: false,
        }
    }

    pub(crate) fn is_tracking(&self) -> bool
    {
        self.tracking
    }

    /// Open a chain whose leaf context is `registers` and whose root
    /// boundary is `end` until something better is known.
    pub(crate) fn begin(&mut self, end: FramePointer, registers: RegisterSnapshot)
    {
        debug_assert!(!self.tracking, "chain tracking is never nested");
        self.tracking = true;
        self.start_registers = registers;
        self.end = end;
        self.hit_exit_frame = false;
    }

    /// Drop the chain without dispatching it.
    pub(crate) fn cancel(&mut self)
    {
        debug_assert!(self.tracking, "cancel without an open chain");
        self.tracking = false;
    }

    pub(crate) fn set_end(&mut self, end: FramePointer)
    {
        self.end = end;
    }

    pub(crate) fn end(&self) -> FramePointer
    {
        self.end
    }

    /// Replace the leaf-edge context. Used when an exit frame supplies a
    /// better view of where managed code handed off to native.
    pub(crate) fn refresh_start(&mut self, registers: RegisterSnapshot)
    {
        self.start_registers = registers;
    }

    pub(crate) fn start_registers(&self) -> RegisterSnapshot
    {
        self.start_registers
    }

    /// The chain's leaf boundary as an ordering identity.
    pub(crate) fn leaf_fp(&self) -> FramePointer
    {
        FramePointer::from_address(self.start_registers.sp)
    }

    pub(crate) fn hit_exit_frame(&self) -> bool
    {
        self.hit_exit_frame
    }

    /// Record that an exit frame anchored this chain.
    pub(crate) fn mark_exit_hit(&mut self)
    {
        debug_assert!(
            !self.hit_exit_frame,
            "two exit frames inside one unmanaged chain"
        );
        self.hit_exit_frame = true;
    }
}
