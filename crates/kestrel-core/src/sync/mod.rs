//! # Signaling and Locking Primitives
//!
//! The small set of blocking primitives the engine's thread protocols are
//! written against:
//!
//! - [`ManualResetEvent`] / [`AutoResetEvent`] - one-shot signaling
//! - [`SignalSet`] - wait on several signals as a unit, first one wins
//! - [`DebuggerLock`] - reentrant lock that survives scope boundaries
//!
//! All of them are condvar-based and carry no OS handles, so they work
//! the same on every platform the engine runs on.

pub mod event;
pub mod lock;
pub mod signal_set;

pub use event::{AutoResetEvent, ManualResetEvent};
pub use lock::DebuggerLock;
pub use signal_set::{SignalSet, SlotMode, WaitOutcome};
