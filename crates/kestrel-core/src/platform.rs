//! # Platform Queries
//!
//! The one platform-specific fact the engine needs: the OS-level id of
//! the calling thread. Thread ids end up in the shared control block and
//! in lock-ownership checks, so they must match what the rest of the
//! process (and an out-of-process debugger) would observe.

use crate::types::OsThreadId;

/// OS-level id of the calling thread.
#[cfg(target_os = "linux")]
pub fn current_thread_id() -> OsThreadId
{
    let tid = unsafe { libc::gettid() };
    OsThreadId::new(tid as u64)
}

/// OS-level id of the calling thread.
#[cfg(target_os = "macos")]
pub fn current_thread_id() -> OsThreadId
{
    let mut tid: u64 = 0;
    // Null pthread handle means "the calling thread".
    unsafe {
        libc::pthread_threadid_np(std::ptr::null_mut(), &mut tid);
    }
    OsThreadId::new(tid)
}

/// Process-local stand-in for platforms without a native query.
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn current_thread_id() -> OsThreadId
{
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    thread_local! {
        static THREAD_ID: u64 = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    }
    THREAD_ID.with(|id| OsThreadId::new(*id))
}

#[cfg(test)]
mod tests
{
    use std::thread;

    use super::*;

    #[test]
    fn test_thread_ids_are_stable_and_distinct()
    {
        let here = current_thread_id();
        assert_eq!(here, current_thread_id());

        let there = thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, there);
    }
}
