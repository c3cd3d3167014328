//! # Error Types
//!
//! General error handling for the engine.
//!
//! We use `thiserror` to automatically generate `Error` trait
//! implementations and nice error messages.

use thiserror::Error;

use crate::types::OsThreadId;

/// Main error type for engine operations
///
/// Most of the engine's thread protocols degrade rather than fail: the
/// canary answers "not safe" when its thread is gone, a dead helper makes
/// favors run inline. The errors that remain are the ones a caller can
/// actually act on.
#[derive(Error, Debug)]
pub enum EngineError
{
    /// The OS refused to create a worker thread
    ///
    /// This happens when:
    /// - The process is out of threads or address space
    /// - Thread creation is blocked during process teardown
    ///
    /// The canary treats this as a permanent "locks unavailable" answer;
    /// the runtime controller reports it to the caller of `start`.
    #[error("Failed to spawn engine thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// Another thread already claimed the helper role
    ///
    /// Exactly one real helper thread may service the debugger at a time.
    /// A second candidate discovering the claim backs out with this error
    /// instead of entering the main loop.
    #[error("Helper role already claimed by thread {existing}")]
    HelperAlreadyClaimed
    {
        /// The thread currently registered as the helper.
        existing: OsThreadId,
    },

    /// The IPC transport failed to move an event
    ///
    /// Wraps whatever the embedding transport reports when copying an
    /// inbound event out of the shared buffer. The helper loop logs these
    /// and keeps running; the failing event is dropped.
    #[error("IPC transport error: {0}")]
    Transport(String),
}

/// Convenience type alias for `Result<T, EngineError>`
///
/// ```rust
/// use kestrel_core::error::EngineResult;
/// fn foo() -> EngineResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type EngineResult<T> = std::result::Result<T, EngineError>;
