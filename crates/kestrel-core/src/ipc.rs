//! # IPC Surface
//!
//! The control block shared with the debugger's remote half, the event
//! shape that crosses it, and the transport seam the helper loop drains.
//!
//! ## Control block ordering
//!
//! Both sides write the block without coordination. The only cross-field
//! guarantee is initialization publication: the size field is stored last
//! with release ordering, so a reader that observes a nonzero size
//! observes every field written before it.

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use smallvec::SmallVec;

use crate::error::EngineResult;
use crate::platform;
use crate::types::OsThreadId;

/// Protocol version this engine speaks.
pub const PROTOCOL_VERSION_CURRENT: u64 = 2;
/// Oldest protocol version this engine still accepts.
pub const PROTOCOL_VERSION_MINIMUM: u64 = 1;

fn id_to_word(id: Option<OsThreadId>) -> u64
{
    match id {
        Some(id) => id.value(),
        None => 0,
    }
}

fn word_to_id(word: u64) -> Option<OsThreadId>
{
    if word == 0 {
        None
    } else {
        Some(OsThreadId::new(word))
    }
}

/// Control block shared with the debugger's remote half
///
/// One per runtime instance. Thread ids use 0 as "unclaimed"; the real
/// helper claims its slot with a compare-exchange so exactly one claim
/// can ever succeed.
#[derive(Debug, Default)]
pub struct DebuggerControlBlock
{
    init_size: AtomicU64,
    protocol_current: AtomicU64,
    protocol_minimum: AtomicU64,
    helper_thread_id: AtomicU64,
    real_helper_thread_id: AtomicU64,
    temporary_helper_thread_id: AtomicU64,
    canary_thread_id: AtomicU64,
    detach_requested: AtomicBool,
}

impl DebuggerControlBlock
{
    pub fn new() -> Self
    {
        let block = Self::default();
        block
            .protocol_current
            .store(PROTOCOL_VERSION_CURRENT, Ordering::Relaxed);
        block
            .protocol_minimum
            .store(PROTOCOL_VERSION_MINIMUM, Ordering::Relaxed);
        block
    }

    /// Mark the block fully populated. Must be the last initialization
    /// store.
    pub fn publish_initialized(&self)
    {
        self.init_size
            .store(mem::size_of::<Self>() as u64, Ordering::Release);
    }

    pub fn is_initialized(&self) -> bool
    {
        self.init_size.load(Ordering::Acquire) != 0
    }

    pub fn protocol_current(&self) -> u64
    {
        self.protocol_current.load(Ordering::Relaxed)
    }

    pub fn protocol_minimum(&self) -> u64
    {
        self.protocol_minimum.load(Ordering::Relaxed)
    }

    /// Claim the helper role for `id`.
    ///
    /// Succeeds only while the slot is unclaimed; on failure the winner's
    /// id is returned.
    pub fn try_claim_helper(&self, id: OsThreadId) -> Result<(), OsThreadId>
    {
        match self.helper_thread_id.compare_exchange(
            0,
            id.value(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(existing) => Err(OsThreadId::new(existing)),
        }
    }

    pub fn helper_thread_id(&self) -> Option<OsThreadId>
    {
        word_to_id(self.helper_thread_id.load(Ordering::Acquire))
    }

    /// Publish the helper id before the helper runs; used by `start` so
    /// observers can recognize the thread from the moment it exists.
    pub fn set_helper_thread_id(&self, id: OsThreadId)
    {
        self.helper_thread_id.store(id.value(), Ordering::Release);
    }

    /// Set once the claimed helper is actually in its main loop.
    pub fn set_real_helper_thread_id(&self, id: OsThreadId)
    {
        self.real_helper_thread_id
            .store(id.value(), Ordering::Relaxed);
    }

    pub fn real_helper_thread_id(&self) -> Option<OsThreadId>
    {
        word_to_id(self.real_helper_thread_id.load(Ordering::Relaxed))
    }

    /// Publish or clear the temporary helper's id.
    pub fn set_temporary_helper_thread_id(&self, id: Option<OsThreadId>)
    {
        self.temporary_helper_thread_id
            .store(id_to_word(id), Ordering::Relaxed);
    }

    pub fn temporary_helper_thread_id(&self) -> Option<OsThreadId>
    {
        word_to_id(self.temporary_helper_thread_id.load(Ordering::Relaxed))
    }

    pub fn set_canary_thread_id(&self, id: OsThreadId)
    {
        self.canary_thread_id.store(id.value(), Ordering::Relaxed);
    }

    pub fn canary_thread_id(&self) -> Option<OsThreadId>
    {
        word_to_id(self.canary_thread_id.load(Ordering::Relaxed))
    }

    pub fn request_detach(&self)
    {
        self.detach_requested.store(true, Ordering::Relaxed);
    }

    pub fn is_detach_requested(&self) -> bool
    {
        self.detach_requested.load(Ordering::Relaxed)
    }

    /// Is the calling thread doing helper duty, real or temporary?
    pub fn is_current_thread_helper(&self) -> bool
    {
        let me = platform::current_thread_id().value();
        self.helper_thread_id.load(Ordering::Acquire) == me
            || self.temporary_helper_thread_id.load(Ordering::Relaxed) == me
    }
}

/// One debugger event as it crosses the transport
///
/// The engine does not interpret the payload; codes and bytes belong to
/// the façade. Small payloads stay inline.
#[derive(Debug, Clone, Default)]
pub struct DebuggerIpcEvent
{
    /// Event code, meaningful to the façade.
    pub code: u32,
    /// Asynchronous events need no reply; the sender is released as soon
    /// as the event is copied out.
    pub async_send: bool,
    pub payload: SmallVec<[u8; 64]>,
}

impl DebuggerIpcEvent
{
    /// Synchronous event with an empty payload.
    pub fn new(code: u32) -> Self
    {
        DebuggerIpcEvent {
            code,
            async_send: false,
            payload: SmallVec::new(),
        }
    }

    /// Asynchronous event with an empty payload.
    pub fn asynchronous(code: u32) -> Self
    {
        DebuggerIpcEvent {
            code,
            async_send: true,
            payload: SmallVec::new(),
        }
    }
}

/// Transport seam between the helper loop and the debugger's remote half
///
/// The loop drives this when the event-available signal fires: copy the
/// event into its local buffer, then acknowledge. Asynchronous events are
/// acknowledged before dispatch so the sender can pipeline; synchronous
/// events only after the façade has handled them.
pub trait DebuggerTransport: Send
{
    /// Copy the next inbound event into `into`, freeing the shared
    /// buffer for the sender.
    fn copy_next_event(&mut self, into: &mut DebuggerIpcEvent) -> EngineResult<()>;

    /// Release the sender of the last copied event.
    fn acknowledge_event(&mut self);
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_claim_is_exclusive()
    {
        let block = DebuggerControlBlock::new();
        let first = OsThreadId::new(11);
        let second = OsThreadId::new(22);

        assert!(block.try_claim_helper(first).is_ok());
        assert_eq!(block.try_claim_helper(second), Err(first));
        assert_eq!(block.helper_thread_id(), Some(first));
    }

    #[test]
    fn test_initialization_publication()
    {
        let block = DebuggerControlBlock::new();
        assert!(!block.is_initialized());
        block.publish_initialized();
        assert!(block.is_initialized());
        assert_eq!(block.protocol_current(), PROTOCOL_VERSION_CURRENT);
        assert_eq!(block.protocol_minimum(), PROTOCOL_VERSION_MINIMUM);
    }

    #[test]
    fn test_helper_recognition_covers_temporary()
    {
        let block = DebuggerControlBlock::new();
        assert!(!block.is_current_thread_helper());

        let me = crate::platform::current_thread_id();
        block.set_temporary_helper_thread_id(Some(me));
        assert!(block.is_current_thread_helper());

        block.set_temporary_helper_thread_id(None);
        assert!(!block.is_current_thread_helper());
    }

    #[test]
    fn test_event_constructors()
    {
        let sync = DebuggerIpcEvent::new(3);
        assert!(!sync.async_send);
        let async_event = DebuggerIpcEvent::asynchronous(4);
        assert!(async_event.async_send);
        assert!(async_event.payload.is_empty());
    }
}
