//! # Walk Driver State Machine
//!
//! One [`WalkDriver`] exists per walk. Each raw step from the unwinder
//! runs through the same pipeline:
//!
//! 1. Native markers open unmanaged-chain tracking and consume the step.
//! 2. A method frame staged on the previous step is flushed, now that the
//!    current step can supply its parent frame pointer.
//! 3. Chain tracking folds the step into any open unmanaged chain.
//! 4. The step is classified into at most one stageable record, with
//!    internal transition records dispatched immediately on the side.
//! 5. Funclet bookkeeping decides whether upcoming steps get skipped.
//!
//! The staging delay is the load-bearing piece: a frame's ordering
//! identity comes from its *caller*, so no record is delivered until the
//! walk has moved one step rootward of it.

use tracing::debug;

use crate::config::{ArchProfile, EhModel, WalkConfig};
use crate::types::{
    ChainReason, CodeRegionId, ExplicitFrame, ExplicitFrameKind, FrameInfo, FramePointer,
    FuncletParentHint, IlStubKind, InterceptionKind, MethodNature, RawFrame, RegisterSnapshot,
    StubFrameType, ThreadContext, TransitionKind,
};
use crate::walk::chain::UnmanagedChainTracker;
use crate::walk::{FrameConsumer, WalkControl, WalkOptions, WalkOutcome};

/// Funclet-collapse state carried across callbacks
///
/// After a non-filter funclet is seen, the physical frames between it and
/// its parent do not belong in the logical stack; the driver skips raw
/// steps until the parent is reached. Filters never trigger a skip: they
/// run leafward of their parent while it is still live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncletSkip
{
    /// Frames are classified normally.
    NotSkipping,
    /// The parent is the very next frameless method frame.
    SkipOne,
    /// Skip frameless frames until one whose caller stack pointer equals
    /// the recorded parent frame pointer.
    SkipUntil(FramePointer),
}

/// What classification decided for the current step.
#[derive(Debug, Clone, Copy)]
struct Classified
{
    use_frame: bool,
    managed: bool,
    internal: bool,
    chain: ChainReason,
    stub: StubFrameType,
    rel_offset: u64,
    code_region: Option<CodeRegionId>,
}

impl Classified
{
    fn none() -> Self
    {
        Classified {
            use_frame: false,
            managed: false,
            internal: false,
            chain: ChainReason::None,
            stub: StubFrameType::None,
            rel_offset: 0,
            code_region: None,
        }
    }
}

pub(crate) struct WalkDriver<'a>
{
    options: WalkOptions,
    config: WalkConfig,
    arch: ArchProfile,
    consumer: &'a mut dyn FrameConsumer,
    /// The walker's register view as of the current step.
    live_registers: RegisterSnapshot,
    /// Record waiting for its parent frame pointer.
    staged: Option<FrameInfo>,
    need_parent_info: bool,
    previous_fp: FramePointer,
    skip: FuncletSkip,
    chain: UnmanagedChainTracker,
    raw_dispatch_count: u64,
    target_found: bool,
    /// Managed code was delivered since the last chain marker; the next
    /// unmanaged or thread-start chain gets an enter-managed marker first.
    pending_enter_managed: bool,
    /// Explicit frame of the previous real step, if it had one.
    previous_explicit_frame: Option<ExplicitFrame>,
    // Funclet facts of the most recent real step. Consulted by the
    // native-marker guard before the current step overwrites them.
    scratch_is_leaf: bool,
    scratch_is_funclet: bool,
    scratch_is_filter: bool,
}

impl<'a> WalkDriver<'a>
{
    pub(crate) fn new(
        options: WalkOptions,
        config: WalkConfig,
        arch: ArchProfile,
        consumer: &'a mut dyn FrameConsumer,
    ) -> Self
    {
        WalkDriver {
            options,
            config,
            arch,
            consumer,
            live_registers: RegisterSnapshot::ZEROED,
            staged: None,
            need_parent_info: false,
            previous_fp: FramePointer::LEAF_MOST,
            skip: FuncletSkip::NotSkipping,
            chain: UnmanagedChainTracker::new(),
            raw_dispatch_count: 0,
            target_found: false,
            pending_enter_managed: false,
            previous_explicit_frame: None,
            scratch_is_leaf: false,
            scratch_is_funclet: false,
            scratch_is_filter: false,
        }
    }

    /// Process one raw step from the unwinder.
    pub(crate) fn step(&mut self, raw: &RawFrame) -> WalkControl
    {
        self.live_registers = raw.registers;

        // Native boundary markers only matter for chain tracking. While
        // skipping toward a funclet parent, or right after a non-filter
        // funclet (whose unwind detours through native helpers), the
        // marker is noise.
        if raw.native_marker {
            if self.skip != FuncletSkip::NotSkipping
                || (self.scratch_is_funclet && !self.scratch_is_filter)
            {
                return WalkControl::Continue;
            }
            if !self.chain.is_tracking() {
                self.chain.begin(
                    FramePointer::from_address(self.live_registers.sp),
                    self.live_registers,
                );
            }
            return WalkControl::Continue;
        }

        // Flush the record staged on the previous step; this step is its
        // caller and fixes its frame pointer.
        if self.need_parent_info {
            self.need_parent_info = false;
            if let Some(staged) = self.staged.take() {
                let fp = self.resolve_staged_fp(&staged, Some(raw));
                if self.arch.monotonic_unwind {
                    debug_assert!(
                        self.previous_fp.is_closer_to_leaf(fp),
                        "walk must make rootward progress"
                    );
                    self.previous_fp = fp;
                }
                let mut staged = staged;
                staged.fp = fp;
                let deliver =
                    self.options.provide_internal_frames || !staged.has_stub_frame();
                if deliver && self.invoke(&staged) == WalkControl::Abort {
                    return WalkControl::Abort;
                }
            }
        }

        if self.skip == FuncletSkip::NotSkipping
            && self.track_unmanaged_chain(raw) == WalkControl::Abort
        {
            return WalkControl::Abort;
        }

        // Facts about this step that outlive classification. A pushed but
        // not-yet-crossed exit frame means its pusher is still the leaf.
        self.scratch_is_leaf = raw.active
            || raw.faulted
            || matches!(
                self.previous_explicit_frame,
                Some(frame)
                    if frame.kind == ExplicitFrameKind::Exit && !frame.has_exited_runtime()
            );
        self.scratch_is_funclet = raw.funclet;
        self.scratch_is_filter = raw.funclet && raw.filter_funclet;

        // Has the skip region reached the funclet's parent? Re-check the
        // parent itself: nested funclets chain the skip onward.
        if raw.frameless && self.skip != FuncletSkip::NotSkipping {
            let reached = match self.skip {
                FuncletSkip::SkipOne => true,
                FuncletSkip::SkipUntil(target) => raw
                    .caller_sp
                    .is_some_and(|sp| FramePointer::from_address(sp) == target),
                FuncletSkip::NotSkipping => false,
            };
            if reached {
                self.skip = self.check_for_parent_fp(FuncletSkip::NotSkipping, raw);
                debug!(state = ?self.skip, "funclet skip reached its parent");
            }
        }

        self.previous_explicit_frame = raw.explicit_frame;

        let mut classified = Classified::none();

        if self.skip != FuncletSkip::NotSkipping {
            // Physical frames between a funclet and its parent are not
            // part of the logical stack.
        } else if raw.frameless {
            match raw.method_nature {
                MethodNature::IlStub(kind) => match kind {
                    // These two stubs stand in for user code and are worth
                    // a method record; every other IL stub is plumbing.
                    IlStubKind::MulticastDelegate | IlStubKind::TailCallCallTarget => {
                        classified.use_frame = true;
                        classified.managed = true;
                        classified.rel_offset = self.adjust_rel_offset(raw);
                        classified.code_region = raw.code_region;
                    }
                    IlStubKind::Other => {}
                },
                MethodNature::Dynamic => {
                    if self.options.provide_internal_frames {
                        classified.use_frame = true;
                        classified.managed = true;
                        classified.stub = StubFrameType::LightweightFunction;
                    }
                }
                MethodNature::Ordinary => {
                    classified.use_frame = true;
                    classified.managed = true;
                    classified.rel_offset = self.adjust_rel_offset(raw);
                    classified.code_region = raw.code_region;
                }
            }
        } else if let Some(frame) = raw.explicit_frame {
            classified.chain = match frame.interception {
                InterceptionKind::ClassInit | InterceptionKind::Prestub => ChainReason::ClassInit,
                InterceptionKind::Exception => ChainReason::ExceptionFilter,
                InterceptionKind::Context => ChainReason::ContextPolicy,
                InterceptionKind::Security => ChainReason::Security,
                InterceptionKind::None => ChainReason::None,
            };

            match frame.kind {
                ExplicitFrameKind::Entry
                | ExplicitFrameKind::Exit
                | ExplicitFrameKind::HelperMethod
                | ExplicitFrameKind::Internal => {
                    // Plain bookkeeping frames only matter when an
                    // interception hangs off them, and never at the leaf.
                    if classified.chain != ChainReason::None && !raw.active {
                        classified.use_frame = true;
                        classified.managed = true;
                        classified.internal = false;
                    }
                }
                ExplicitFrameKind::Interception | ExplicitFrameKind::Security => {
                    classified.use_frame = true;
                    classified.managed = true;
                    classified.internal = true;
                }
                ExplicitFrameKind::StubDispatch => {
                    // Dispatch resolution is invisible to consumers.
                }
                ExplicitFrameKind::Call => {
                    classified.use_frame = true;
                    classified.managed = true;
                    classified.internal = false;
                }
                ExplicitFrameKind::FuncEval { show } => {
                    classified.managed = true;
                    classified.internal = true;
                    classified.chain = ChainReason::FuncEval;
                    classified.use_frame = show;
                    if show && self.options.provide_internal_frames {
                        let stub = FrameInfo::for_stub(
                            StubFrameType::FuncEval,
                            Some(frame.address),
                            raw.method,
                            self.live_registers,
                            raw.app_domain,
                        );
                        if self.invoke(&stub) == WalkControl::Abort {
                            return WalkControl::Abort;
                        }
                    }
                }
                ExplicitFrameKind::Multicast => {
                    if !self.options.ignore_nonmethod_frames {
                        classified.use_frame = true;
                        classified.managed = true;
                        classified.internal = false;
                    }
                }
            }
        }

        // Transition records go out immediately, skip state or not; they
        // describe the frame itself, not a method hanging off it.
        if self.options.provide_internal_frames {
            if let Some(frame) = raw.explicit_frame {
                let stub_type = match frame.transition {
                    TransitionKind::UnmanagedToManaged => {
                        Some(StubFrameType::UnmanagedToManaged)
                    }
                    TransitionKind::AppDomain => Some(StubFrameType::AppDomainTransition),
                    TransitionKind::ManagedToUnmanaged | TransitionKind::None => None,
                };
                if let Some(stub_type) = stub_type {
                    let stub = FrameInfo::for_stub(
                        stub_type,
                        Some(frame.address),
                        raw.method,
                        self.live_registers,
                        raw.app_domain,
                    );
                    if self.invoke(&stub) == WalkControl::Abort {
                        return WalkControl::Abort;
                    }
                }
            }
        }

        if classified.use_frame {
            self.staged = Some(FrameInfo {
                method: raw.method,
                frame_address: raw.explicit_frame.map(|frame| frame.address),
                fp: FramePointer::LEAF_MOST,
                managed: classified.managed,
                internal: classified.internal,
                chain_reason: classified.chain,
                stub_type: classified.stub,
                registers: self.live_registers,
                rel_offset: classified.rel_offset,
                code_region: classified.code_region,
                app_domain: raw.app_domain,
                is_leaf: self.scratch_is_leaf,
                is_funclet: self.scratch_is_funclet,
                is_filter: self.scratch_is_filter,
            });
            self.need_parent_info = true;
        }

        self.skip = self.check_for_parent_fp(self.skip, raw);

        // Unwinding through an explicit frame can land in a context the
        // walker itself never materializes.
        if !raw.frameless {
            if let Some(frame) = raw.explicit_frame {
                if let Some(unwound) = frame.unwound_registers {
                    self.live_registers = unwound;
                }
            }
        }

        WalkControl::Continue
    }

    /// Close out the walk: flush any staged record, then deliver the
    /// terminal thread-start chain.
    pub(crate) fn finish(&mut self, thread: &ThreadContext) -> WalkOutcome
    {
        if self.need_parent_info {
            self.need_parent_info = false;
            if let Some(staged) = self.staged.take() {
                let fp = self.resolve_staged_fp(&staged, None);
                let mut staged = staged;
                staged.fp = fp;
                let deliver =
                    self.options.provide_internal_frames || !staged.has_stub_frame();
                if deliver && self.invoke(&staged) == WalkControl::Abort {
                    return WalkOutcome::Aborted;
                }
            }
        }

        // An unmanaged chain still open at the root folds into the
        // thread-start chain; otherwise the chain sits at the stack base.
        let (fp, registers) = if self.chain.is_tracking() {
            let registers = self.chain.start_registers();
            (FramePointer::from_address(registers.sp), registers)
        } else {
            (
                FramePointer::from_address(thread.stack_base),
                self.live_registers,
            )
        };

        let terminal = FrameInfo::for_thread_start(fp, registers);
        match self.invoke(&terminal) {
            WalkControl::Abort => WalkOutcome::Aborted,
            WalkControl::Continue => WalkOutcome::Completed,
        }
    }

    /// Fold the current step into the open unmanaged chain, dispatching
    /// or cancelling the chain when this step closes it.
    fn track_unmanaged_chain(&mut self, raw: &RawFrame) -> WalkControl
    {
        let mut dispatch = false;

        if !self.chain.is_tracking() {
            match raw.explicit_frame {
                // An exit frame proves native code sits rootward of here
                // even when no native marker opened a chain.
                Some(frame) if frame.kind == ExplicitFrameKind::Exit => {
                    self.chain.begin(
                        FramePointer::from_address(self.live_registers.sp),
                        self.live_registers,
                    );
                }
                _ => return WalkControl::Continue,
            }
        }

        if let Some(frame) = raw.explicit_frame {
            // Every explicit frame rootward of the chain start pushes the
            // chain's root boundary out to itself.
            self.chain.set_end(FramePointer::from_address(frame.address));

            if frame.transition == TransitionKind::AppDomain
                || matches!(frame.kind, ExplicitFrameKind::FuncEval { .. })
            {
                // Neither crossing represents native user code.
                self.chain.cancel();
                return WalkControl::Continue;
            }

            if frame.transition == TransitionKind::ManagedToUnmanaged {
                dispatch = true;
            }

            if frame.kind == ExplicitFrameKind::Exit {
                if self.live_registers.has_valid_pc() {
                    self.chain.refresh_start(self.live_registers);
                }
                self.chain.mark_exit_hit();

                if frame.has_exited_runtime() {
                    dispatch = true;
                    let call_site = frame
                        .exit
                        .and_then(|info| info.call_site_sp)
                        .unwrap_or(frame.address - self.arch.pointer_width);
                    let new_end = FramePointer::from_address(call_site);
                    // Prune the chain back to the call site, but never
                    // past its own leaf.
                    if new_end.is_closer_to_root(self.chain.leaf_fp()) {
                        self.chain.set_end(new_end);
                    }
                } else {
                    // Frame is pushed but control never left; there is no
                    // native code out there to report.
                    self.chain.cancel();
                    return WalkControl::Continue;
                }
            }

            if frame.interception != InterceptionKind::None {
                dispatch = true;
            }
        } else {
            // A managed method closes any chain under it.
            dispatch = true;
        }

        if dispatch {
            if self.need_parent_info
                && self.staged.as_ref().is_some_and(FrameInfo::has_method_frame)
            {
                // A staged method frame claims this boundary already.
                self.chain.cancel();
                return WalkControl::Continue;
            }

            if !self.chain.hit_exit_frame()
                && !self.options.ignore_nonmethod_frames
                && self.raw_dispatch_count > 0
                && self.config.suppress_unanchored_chains
            {
                debug!("dropping unmanaged chain with no exit frame anchor");
                self.chain.cancel();
                return WalkControl::Continue;
            }

            let fp_root = self.chain.end();
            if fp_root == self.chain.leaf_fp() {
                // Empty chain.
                self.chain.cancel();
                return WalkControl::Continue;
            }

            let record = FrameInfo::for_unmanaged_chain(fp_root, self.chain.start_registers());
            if self.invoke(&record) == WalkControl::Abort {
                return WalkControl::Abort;
            }
            self.chain.cancel();

            if self.options.provide_internal_frames {
                if let Some(frame) = raw.explicit_frame {
                    if frame.transition == TransitionKind::ManagedToUnmanaged {
                        let stub = FrameInfo::for_stub(
                            StubFrameType::ManagedToUnmanaged,
                            Some(frame.address),
                            raw.method,
                            self.live_registers,
                            raw.app_domain,
                        );
                        if self.invoke(&stub) == WalkControl::Abort {
                            return WalkControl::Abort;
                        }
                    }
                }
            }
        }

        WalkControl::Continue
    }

    /// Ordering identity for a staged record, resolved one step late.
    fn resolve_staged_fp(&self, staged: &FrameInfo, current: Option<&RawFrame>) -> FramePointer
    {
        match self.arch.eh {
            EhModel::Funclets => match staged.frame_address {
                Some(address) => FramePointer::from_address(address),
                None => FramePointer::from_address(staged.registers.stack_mark),
            },
            EhModel::X86Chained => {
                let anchored = current.map_or(true, |raw| !raw.frameless);
                match staged.frame_address {
                    Some(address) if anchored => FramePointer::from_address(address),
                    _ => FramePointer::from_address(self.live_registers.stack_mark),
                }
            }
        }
    }

    /// Enter (or stay in) funclet-skip state based on the current step.
    fn check_for_parent_fp(&self, skip: FuncletSkip, raw: &RawFrame) -> FuncletSkip
    {
        if !self.arch.has_funclets() {
            return skip;
        }
        match skip {
            FuncletSkip::NotSkipping => {
                if raw.funclet && !raw.filter_funclet {
                    match raw.funclet_parent {
                        FuncletParentHint::Known(fp) => FuncletSkip::SkipUntil(fp),
                        FuncletParentHint::Unknown => FuncletSkip::SkipOne,
                        FuncletParentHint::None => FuncletSkip::NotSkipping,
                    }
                } else {
                    FuncletSkip::NotSkipping
                }
            }
            // One skip region at a time; finish it before starting
            // another.
            skipping => skipping,
        }
    }

    /// Deliver a record. A chain marker settles any deferred enter-managed
    /// marker: a managed chain stands in for it, an unmanaged chain gets it
    /// synthesized in front.
    fn invoke(&mut self, record: &FrameInfo) -> WalkControl
    {
        if record.frame_address.is_none() && record.has_method_frame() {
            self.pending_enter_managed = true;
        }

        if record.has_chain_marker() {
            if record.managed {
                // A managed chain already brackets the run.
                self.pending_enter_managed = false;
            } else if self.pending_enter_managed {
                self.pending_enter_managed = false;

                let fp = FramePointer::from_address(
                    record.registers.sp - self.arch.pointer_width,
                );
                let marker = FrameInfo::for_enter_managed_chain(fp);
                if self.raw_invoke(&marker) == WalkControl::Abort {
                    return WalkControl::Abort;
                }
            }
        }

        self.raw_invoke(record)
    }

    fn raw_invoke(&mut self, record: &FrameInfo) -> WalkControl
    {
        record.assert_valid();
        self.raw_dispatch_count += 1;

        if !self.target_found
            && self.options.target_fp.is_equal_or_closer_to_leaf(record.fp)
        {
            self.target_found = true;
        }
        if !self.target_found {
            return WalkControl::Continue;
        }

        self.consumer.on_frame(record)
    }

    fn adjust_rel_offset(&self, raw: &RawFrame) -> u64
    {
        if self.arch.strip_thumb_bit {
            raw.rel_offset & !1
        } else {
            raw.rel_offset
        }
    }
}
