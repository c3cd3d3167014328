//! Classified frame records delivered to walk consumers.

use crate::types::{
    Address, AppDomainId, CodeRegionId, FramePointer, MethodId, RegisterSnapshot,
};

/// Why a chain marker was emitted
///
/// A *chain* brackets a contiguous run of frames sharing one reason; the
/// consumer sees a single marker rather than one record per native frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainReason
{
    /// Not a chain marker.
    None,
    /// The synthetic root-most chain every walk ends with.
    ThreadStart,
    /// Managed code begins here (synthesized before the unmanaged chain
    /// that follows a run of managed frames).
    EnterManaged,
    /// A run of native user code.
    EnterUnmanaged,
    /// Class initializer triggered by the runtime.
    ClassInit,
    /// An exception filter is in control.
    ExceptionFilter,
    /// Context transition policy code.
    ContextPolicy,
    /// Security interception code.
    Security,
    /// A debugger-initiated function evaluation.
    FuncEval,
}

/// Kind of runtime-generated stub a record stands for
///
/// Stub records are only delivered when the consumer opted into internal
/// frames; they mark transitions rather than user methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubFrameType
{
    /// Not a stub record.
    None,
    /// Managed-to-unmanaged call transition.
    ManagedToUnmanaged,
    /// Unmanaged-to-managed call transition.
    UnmanagedToManaged,
    /// Application-domain transition.
    AppDomainTransition,
    /// Function-evaluation setup frame.
    FuncEval,
    /// A dynamic method with no backing metadata module.
    LightweightFunction,
}

/// One entry of a logical call stack
///
/// Produced by the walk driver and handed to the consumer callback one at a
/// time, ordered leaf to root. A record is exactly one of: a managed method
/// frame, a stub record, a chain marker, or a bare internal frame - the
/// predicate methods tell them apart.
#[derive(Debug, Clone)]
pub struct FrameInfo
{
    /// Method identity, present iff this is a method frame.
    pub method: Option<MethodId>,
    /// The explicit runtime frame this record was built from, if any.
    pub frame_address: Option<Address>,
    /// Ordering identity. Never `LEAF_MOST` in a delivered record.
    pub fp: FramePointer,
    /// Managed code (or a marker bracketing managed code).
    pub managed: bool,
    /// Runtime-internal frame surfaced on request.
    pub internal: bool,
    pub chain_reason: ChainReason,
    pub stub_type: StubFrameType,
    /// Register view captured when this record was classified.
    pub registers: RegisterSnapshot,
    /// Code offset within the method, zero for non-method records.
    pub rel_offset: u64,
    /// Compiled-code region the pc falls in, for method frames.
    pub code_region: Option<CodeRegionId>,
    /// Domain the frame was executing in.
    pub app_domain: Option<AppDomainId>,
    /// Leaf-most frame of the walk (active frame or fault point).
    pub is_leaf: bool,
    /// Exception-handling funclet (funclet architectures only).
    pub is_funclet: bool,
    /// Filter funclet; filters are reported alongside their parent.
    pub is_filter: bool,
}

impl FrameInfo
{
    /// Does this record represent a managed method frame?
    pub fn has_method_frame(&self) -> bool
    {
        self.method.is_some()
    }

    /// Does this record represent a runtime stub?
    pub fn has_stub_frame(&self) -> bool
    {
        self.stub_type != StubFrameType::None
    }

    /// Does this record carry a chain marker?
    pub fn has_chain_marker(&self) -> bool
    {
        self.chain_reason != ChainReason::None
    }

    /// Funclet that is not a filter; these get collapsed into their parent
    /// by the skip machinery.
    pub fn is_non_filter_funclet(&self) -> bool
    {
        self.is_funclet && !self.is_filter
    }

    /// Check every cross-field rule a record must satisfy before delivery.
    ///
    /// Debug builds panic on violation; release builds do nothing. The walk
    /// driver calls this on every record it is about to hand out.
    pub fn assert_valid(&self)
    {
        debug_assert!(
            !(self.has_stub_frame() && self.has_chain_marker()),
            "a record cannot be both a stub and a chain marker"
        );
        debug_assert!(
            self.has_method_frame()
                || self.has_stub_frame()
                || self.has_chain_marker()
                || self.internal,
            "empty record: no method, stub, chain, or internal marking"
        );
        if self.has_method_frame() {
            debug_assert!(self.managed, "method frames are always managed");
            debug_assert!(
                self.app_domain.is_some(),
                "method frames carry their domain"
            );
        }
        if self.has_chain_marker() && !self.managed {
            debug_assert!(
                matches!(
                    self.chain_reason,
                    ChainReason::ThreadStart | ChainReason::EnterUnmanaged
                ),
                "unmanaged chains are only thread-start or enter-unmanaged"
            );
        }
        if self.managed && self.has_chain_marker() {
            debug_assert!(
                self.chain_reason != ChainReason::EnterUnmanaged,
                "enter-unmanaged chains are never managed"
            );
        }
        debug_assert!(!self.fp.is_leaf_most(), "record fp was never resolved");
        if self.fp.is_root_most() {
            debug_assert!(
                matches!(
                    self.chain_reason,
                    ChainReason::ThreadStart | ChainReason::EnterUnmanaged
                ),
                "only terminal chains may sit at the root-most sentinel"
            );
        }
        if self.has_stub_frame() {
            debug_assert!(
                self.frame_address.is_some()
                    || self.stub_type == StubFrameType::LightweightFunction,
                "stub records are anchored to a frame unless lightweight"
            );
        }
    }

    fn blank() -> Self
    {
        FrameInfo {
            method: None,
            frame_address: None,
            fp: FramePointer::LEAF_MOST,
            managed: false,
            internal: false,
            chain_reason: ChainReason::None,
            stub_type: StubFrameType::None,
            registers: RegisterSnapshot::ZEROED,
            rel_offset: 0,
            code_region: None,
            app_domain: None,
            is_leaf: false,
            is_funclet: false,
            is_filter: false,
        }
    }

    /// Chain marker for a run of native user code.
    ///
    /// `fp_root` is the chain's root boundary; `registers` is the snapshot
    /// captured at the chain's leaf boundary when tracking began.
    pub(crate) fn for_unmanaged_chain(
        fp_root: FramePointer,
        registers: RegisterSnapshot,
    ) -> Self
    {
        debug_assert!(
            FramePointer::from_address(registers.sp).is_closer_to_leaf(fp_root),
            "unmanaged chain leaf must sit below its root"
        );
        FrameInfo {
            fp: fp_root,
            chain_reason: ChainReason::EnterUnmanaged,
            registers,
            ..Self::blank()
        }
    }

    /// Synthesized marker announcing that managed code ran leafward of the
    /// unmanaged chain about to be delivered. Carries no machine context.
    pub(crate) fn for_enter_managed_chain(fp_root: FramePointer) -> Self
    {
        FrameInfo {
            fp: fp_root,
            managed: true,
            chain_reason: ChainReason::EnterManaged,
            ..Self::blank()
        }
    }

    /// The terminal chain of every walk: the thread's native origin.
    pub(crate) fn for_thread_start(fp: FramePointer, registers: RegisterSnapshot) -> Self
    {
        FrameInfo {
            fp,
            chain_reason: ChainReason::ThreadStart,
            registers,
            ..Self::blank()
        }
    }

    /// Stub record anchored at an explicit runtime frame.
    ///
    /// The frame's own address doubles as the record's fp when present;
    /// lightweight-function records have no frame and borrow the snapshot's
    /// stack pointer until the staging flush fills in the real fp.
    pub(crate) fn for_stub(
        stub_type: StubFrameType,
        frame_address: Option<Address>,
        method: Option<MethodId>,
        registers: RegisterSnapshot,
        app_domain: Option<AppDomainId>,
    ) -> Self
    {
        let fp = match frame_address {
            Some(address) => FramePointer::from_address(address),
            None => FramePointer::from_address(registers.sp),
        };
        FrameInfo {
            method,
            frame_address,
            fp,
            managed: true,
            stub_type,
            registers,
            app_domain,
            ..Self::blank()
        }
    }
}
