//! # kestrel-core
//!
//! Managed-runtime debugger engine primitives for Kestrel.
//!
//! This crate provides the in-process half of the debugger, including:
//! - Stackwalk driving and frame classification
//! - The dedicated helper thread and its event loop
//! - The lock canary that keeps the helper from deadlocking itself
//! - Module shadow bookkeeping
//!
//! ## How the pieces fit
//!
//! [`rcthread::RuntimeController`] owns the helper thread and the canary,
//! and talks to the embedding runtime through two seams it does not
//! implement: [`debugger::DebuggerDelegate`] (suspension, event handling,
//! locks) and [`ipc::DebuggerTransport`] (the wire to the debugger
//! process). [`walk::walk_stack`] turns the raw unwind steps produced by a
//! [`walk::StackWalker`] into the classified [`types::FrameInfo`] records
//! consumers operate on.
//!
//! Everything is owned and explicitly initialized; there are no
//! process-global singletons.
//!
//! ## Why unsafe code is needed
//!
//! The engine identifies threads by OS thread id so that identity survives
//! across the shared-memory control block. Getting that id means calling
//! platform thread APIs (`gettid`, `pthread_threadid_np`) directly. Those
//! calls are wrapped once in [`platform`] and nothing else is unsafe.

#![allow(unsafe_code)] // Required for OS thread-id syscalls (gettid etc.)

pub mod canary;
pub mod config;
pub mod debugger;
pub mod error;
pub mod ipc;
pub mod module_table;
pub mod platform;
pub mod rcthread;
pub mod sync;
pub mod types;
pub mod walk;

// Re-export commonly used types
pub use canary::HelperCanary;
pub use debugger::DebuggerDelegate;
pub use error::{EngineError, EngineResult};
pub use ipc::{DebuggerControlBlock, DebuggerIpcEvent, DebuggerTransport};
pub use rcthread::{ControllerState, RuntimeController};
pub use types::{FrameInfo, FramePointer, RawFrame};
pub use walk::{walk_stack, WalkControl, WalkOptions, WalkOutcome};
