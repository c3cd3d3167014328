//! # Core Types
//!
//! Strongly typed building blocks shared by the stackwalk and the
//! helper-thread machinery:
//!
//! - [`Address`] - a raw stack or code location
//! - [`FramePointer`] - ordered identity of one logical stack frame
//! - [`RegisterSnapshot`] - the minimal register view a walk carries
//! - [`FrameInfo`] - one classified entry of a logical call stack
//! - runtime collaborator model ([`RawFrame`], [`ExplicitFrame`], ...)
//!
//! Everything here is plain data. The walk driver owns the rules for how
//! these values may change over the course of a stackwalk.

pub mod address;
pub mod frame;
pub mod frame_pointer;
pub mod ids;
pub mod registers;
pub mod runtime;

pub use address::Address;
pub use frame::{ChainReason, FrameInfo, StubFrameType};
pub use frame_pointer::FramePointer;
pub use ids::{AppDomainId, CodeRegionId, MethodId, OsThreadId, RuntimeModuleId};
pub use registers::RegisterSnapshot;
pub use runtime::{
    ExitInfo, ExplicitFrame, ExplicitFrameKind, FuncletParentHint, IlStubKind, InterceptionKind,
    MethodNature, RawFrame, ThreadContext, TransitionKind,
};
