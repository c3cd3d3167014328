//! # Stackwalk Driver
//!
//! Turns the raw unwind steps produced by the execution engine's walker
//! into the classified frame records debugger consumers operate on.
//!
//! ## Shape of a walk
//!
//! The underlying walker visits one raw step at a time, leaf to root. The
//! driver classifies each step, stages method frames until the *next*
//! callback can supply their parent frame pointer, collapses runs of
//! native code into single chain markers, and finishes every walk with a
//! terminal thread-start chain. Consequences of the one-behind staging:
//! every delivered record carries a resolved, strictly increasing frame
//! pointer, and the records for one frame always arrive before any record
//! of a frame rootward of it.
//!
//! ## Collaborator seams
//!
//! [`StackWalker`] is implemented by the embedding runtime and does the
//! actual unwinding; the driver never touches machine context beyond the
//! [`RegisterSnapshot`](crate::types::RegisterSnapshot) projection each
//! step carries. [`FrameConsumer`] receives the classified records; any
//! `FnMut(&FrameInfo) -> WalkControl` closure qualifies.

mod chain;
mod driver;

pub use driver::FuncletSkip;

use tracing::{debug, warn};

use crate::config::{ArchProfile, WalkConfig};
use crate::types::{FrameInfo, FramePointer, RawFrame, ThreadContext};

use self::driver::WalkDriver;

/// Flow control returned from every frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl
{
    /// Keep walking rootward.
    Continue,
    /// Stop the walk now; no further records, no terminal chain.
    Abort,
}

/// How the underlying walker's pass over the raw stack ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawWalkOutcome
{
    /// Every raw frame was visited.
    Done,
    /// The visitor asked to stop.
    Aborted,
    /// The walker could not unwind past some point. The frames already
    /// visited are still trustworthy.
    Failed,
}

/// How a driven walk ended, as reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome
{
    /// All records were delivered, terminal chain included.
    Completed,
    /// The consumer aborted; delivery stopped at that record.
    Aborted,
}

/// Per-walk behavior switches chosen by the consumer.
#[derive(Debug, Clone, Copy)]
pub struct WalkOptions
{
    /// Suppress record delivery until a record at or rootward of this
    /// frame is reached. [`FramePointer::LEAF_MOST`] delivers everything.
    pub target_fp: FramePointer,
    /// Only method frames matter to this consumer; runtime bookkeeping
    /// frames that merely bracket them are dropped where possible.
    pub ignore_nonmethod_frames: bool,
    /// Deliver runtime-internal stub records (transitions, func-evals,
    /// lightweight functions) in addition to method frames and chains.
    pub provide_internal_frames: bool,
}

impl Default for WalkOptions
{
    fn default() -> Self
    {
        WalkOptions {
            target_fp: FramePointer::LEAF_MOST,
            ignore_nonmethod_frames: false,
            provide_internal_frames: false,
        }
    }
}

/// The execution engine's raw unwinder
///
/// `walk_frames` must call `visit` once per raw step, ordered leaf to
/// root, and return [`RawWalkOutcome::Aborted`] as soon as the visitor
/// does. Unwind failures are reported as [`RawWalkOutcome::Failed`]
/// rather than panicking; the driver still closes out the walk.
pub trait StackWalker
{
    fn walk_frames(
        &mut self,
        visit: &mut dyn FnMut(&RawFrame) -> WalkControl,
    ) -> RawWalkOutcome;
}

/// Receiver of classified frame records.
pub trait FrameConsumer
{
    fn on_frame(&mut self, frame: &FrameInfo) -> WalkControl;
}

impl<F> FrameConsumer for F
where
    F: FnMut(&FrameInfo) -> WalkControl,
{
    fn on_frame(&mut self, frame: &FrameInfo) -> WalkControl
    {
        self(frame)
    }
}

/// Drive one full stackwalk over `thread`
///
/// Classifies every step `walker` produces and delivers the resulting
/// records to `consumer`, leaf to root, ending with the thread-start
/// chain. Threads that never started or already died produce only that
/// terminal chain, anchored at the thread's stack base.
///
/// A [`RawWalkOutcome::Failed`] from the walker is logged and treated
/// like a completed pass: whatever was staged is flushed and the
/// terminal chain is still delivered, so consumers always see a closed
/// stack.
pub fn walk_stack<W, C>(
    walker: &mut W,
    thread: &ThreadContext,
    options: WalkOptions,
    config: WalkConfig,
    arch: ArchProfile,
    consumer: &mut C,
) -> WalkOutcome
where
    W: StackWalker,
    C: FrameConsumer,
{
    let mut driver = WalkDriver::new(options, config, arch, consumer);

    if !thread.started || thread.dead {
        debug!(thread = %thread.os_id, "thread never ran or is dead; terminal chain only");
        return driver.finish(thread);
    }

    match walker.walk_frames(&mut |raw| driver.step(raw)) {
        RawWalkOutcome::Aborted => WalkOutcome::Aborted,
        RawWalkOutcome::Done => driver.finish(thread),
        RawWalkOutcome::Failed => {
            warn!(thread = %thread.os_id, "stackwalk failed partway; closing out the walk");
            driver.finish(thread)
        }
    }
}
