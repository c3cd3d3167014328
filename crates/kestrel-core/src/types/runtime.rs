//! # Runtime Collaborator Model
//!
//! Closed data model of what the execution engine hands the walk driver at
//! each unwind step. The engine's own frame objects stay on its side of the
//! boundary; collaborators project each one into a [`RawFrame`] and the
//! driver classifies from there with exhaustive matches.

use crate::types::{
    Address, AppDomainId, CodeRegionId, FramePointer, MethodId, OsThreadId, RegisterSnapshot,
};

/// Coarse kind of an explicit runtime bookkeeping frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplicitFrameKind
{
    /// Unmanaged-to-managed entry bookkeeping.
    Entry,
    /// Managed-to-unmanaged exit bookkeeping. Carries [`ExitInfo`].
    Exit,
    /// Frame pushed by a runtime helper before it does real work.
    HelperMethod,
    /// Other runtime-internal bookkeeping.
    Internal,
    /// The runtime intercepted a call (see [`InterceptionKind`]).
    Interception,
    /// Security interception, reported separately by the runtime.
    Security,
    /// Virtual-stub-dispatch resolution frame. Never reported.
    StubDispatch,
    /// A call through a runtime-generated piece of code.
    Call,
    /// Debugger-initiated function evaluation in progress. `show` is
    /// false when the evaluation only exists to abort the thread.
    FuncEval
    {
        show: bool
    },
    /// GC bookkeeping between multicast delegate invocations.
    Multicast,
}

/// Why the runtime interposed on a call, if it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptionKind
{
    None,
    /// Class initializer runs before the real target.
    ClassInit,
    /// Prestub interception; treated like a class initializer.
    Prestub,
    /// Exception handling took over.
    Exception,
    /// Context transition policy code.
    Context,
    /// Security policy code.
    Security,
}

/// Code transition an explicit frame sits on, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind
{
    None,
    /// Managed code calling out to native code.
    ManagedToUnmanaged,
    /// Native code calling into managed code.
    UnmanagedToManaged,
    /// Crossing an application-domain boundary.
    AppDomain,
}

/// What an exit frame knows about the native code rootward of it
///
/// `call_site_sp` is the stack pointer at the point the managed caller
/// made the outbound call. `None` means the runtime could not name it and
/// the chain boundary must be manufactured just leafward of the frame
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo
{
    /// Has control actually left the runtime through this frame? False
    /// while the transition frame is pushed but native code has not been
    /// entered yet.
    pub left_runtime: bool,
    pub call_site_sp: Option<Address>,
}

/// One explicit runtime frame, projected as a closed tag triple
///
/// The engine keeps an open-ended hierarchy of frame objects; the walk
/// only ever needs the `{kind, interception, transition}` triple plus the
/// frame's stack address, so that is all collaborators hand over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplicitFrame
{
    /// Stack address of the frame object. Doubles as its ordering
    /// identity.
    pub address: Address,
    pub kind: ExplicitFrameKind,
    pub interception: InterceptionKind,
    pub transition: TransitionKind,
    /// Present for [`ExplicitFrameKind::Exit`] frames.
    pub exit: Option<ExitInfo>,
    /// Register view after unwinding through this frame. The driver
    /// refreshes its live snapshot from this when the frame is visited.
    pub unwound_registers: Option<RegisterSnapshot>,
}

impl ExplicitFrame
{
    /// Minimal frame of the given kind at `address`; no interception, no
    /// transition, no exit knowledge.
    pub fn new(address: Address, kind: ExplicitFrameKind) -> Self
    {
        ExplicitFrame {
            address,
            kind,
            interception: InterceptionKind::None,
            transition: TransitionKind::None,
            exit: None,
            unwound_registers: None,
        }
    }

    /// Has control left the runtime through this frame?
    ///
    /// Only exit frames can say yes; an exit frame with no [`ExitInfo`]
    /// is treated as still inside the runtime.
    pub fn has_exited_runtime(&self) -> bool
    {
        matches!(self.exit, Some(info) if info.left_runtime)
    }
}

/// How a method's code came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodNature
{
    /// Ordinary metadata-backed managed method.
    Ordinary,
    /// Compiler-generated IL stub.
    IlStub(IlStubKind),
    /// Dynamic method with no backing metadata module.
    Dynamic,
}

/// The IL stub kinds the walk distinguishes.
///
/// Multicast and tail-call target stubs are surfaced to consumers; every
/// other stub is noise and gets dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IlStubKind
{
    MulticastDelegate,
    TailCallCallTarget,
    Other,
}

/// Where a funclet's parent frame sits, as reported by the unwinder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncletParentHint
{
    /// Not a funclet, or no parent lookup applies.
    None,
    /// Parent's frame pointer is known; skip frames until unwound to it.
    Known(FramePointer),
    /// Parent exists but the unwinder cannot name it; it is the very
    /// next method frame.
    Unknown,
}

/// One raw unwind step handed to the walk driver
///
/// A step is either a native marker (the unwinder crossed into native
/// code; only `registers` is meaningful) or a description of a managed
/// method, an explicit runtime frame, or both at once. The driver never
/// sees the engine's own frame objects, only this projection.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame
{
    /// Explicit runtime frame at this step, if one exists.
    pub explicit_frame: Option<ExplicitFrame>,
    /// Managed method executing at this step, if known.
    pub method: Option<MethodId>,
    pub method_nature: MethodNature,
    /// Register view at this step.
    pub registers: RegisterSnapshot,
    /// Raw code offset within the method, before any architecture
    /// adjustment.
    pub rel_offset: u64,
    /// Domain the thread was in while running this frame's code.
    pub app_domain: Option<AppDomainId>,
    /// Compiled-code region the pc falls in, for frameless methods.
    pub code_region: Option<CodeRegionId>,
    /// Boundary marker: the unwinder stepped into native code.
    pub native_marker: bool,
    /// JIT-compiled code with no explicit frame object.
    pub frameless: bool,
    /// The thread's active (leaf-most) context.
    pub active: bool,
    /// A native fault was raised at this step.
    pub faulted: bool,
    /// This step is an exception-handling funclet.
    pub funclet: bool,
    /// The funclet is a filter; filters are never skipped.
    pub filter_funclet: bool,
    /// Parent lookup result when `funclet` is set.
    pub funclet_parent: FuncletParentHint,
    /// Caller's stack pointer, when the unwinder knows it. Used to decide
    /// whether a skip region has reached its target parent.
    pub caller_sp: Option<Address>,
}

impl RawFrame
{
    fn blank(registers: RegisterSnapshot) -> Self
    {
        RawFrame {
            explicit_frame: None,
            method: None,
            method_nature: MethodNature::Ordinary,
            registers,
            rel_offset: 0,
            app_domain: None,
            code_region: None,
            native_marker: false,
            frameless: false,
            active: false,
            faulted: false,
            funclet: false,
            filter_funclet: false,
            funclet_parent: FuncletParentHint::None,
            caller_sp: None,
        }
    }

    /// Native-code boundary marker.
    pub fn native_marker(registers: RegisterSnapshot) -> Self
    {
        RawFrame {
            native_marker: true,
            ..Self::blank(registers)
        }
    }

    /// Frameless managed method step.
    pub fn managed_method(
        method: MethodId,
        registers: RegisterSnapshot,
        app_domain: AppDomainId,
    ) -> Self
    {
        RawFrame {
            method: Some(method),
            frameless: true,
            app_domain: Some(app_domain),
            ..Self::blank(registers)
        }
    }

    /// Step at an explicit runtime frame.
    pub fn explicit(frame: ExplicitFrame, registers: RegisterSnapshot) -> Self
    {
        RawFrame {
            explicit_frame: Some(frame),
            ..Self::blank(registers)
        }
    }
}

/// What the walk needs to know about the thread it runs over.
#[derive(Debug, Clone, Copy)]
pub struct ThreadContext
{
    pub os_id: OsThreadId,
    /// Root-most address of the thread's stack; anchors the terminal
    /// thread-start chain.
    pub stack_base: Address,
    /// False for threads that have been created but never scheduled.
    pub started: bool,
    pub dead: bool,
}

impl ThreadContext
{
    /// A live, started thread.
    pub fn new(os_id: OsThreadId, stack_base: Address) -> Self
    {
        ThreadContext {
            os_id,
            stack_base,
            started: true,
            dead: false,
        }
    }
}
