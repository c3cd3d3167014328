//! Opaque identity handles.
//!
//! The engine never looks inside these; they are minted by the embedding
//! runtime and compared or passed back verbatim.

use std::fmt;

/// OS-level thread id, as reported by the platform (`gettid` and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OsThreadId(u64);

impl OsThreadId
{
    pub const fn new(value: u64) -> Self
    {
        OsThreadId(value)
    }

    pub const fn value(self) -> u64
    {
        self.0
    }
}

impl fmt::Display for OsThreadId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Identity of a managed method, minted by the runtime's metadata system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId(u64);

impl MethodId
{
    pub const fn new(value: u64) -> Self
    {
        MethodId(value)
    }

    pub const fn value(self) -> u64
    {
        self.0
    }
}

/// Identity of an application domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppDomainId(u64);

impl AppDomainId
{
    pub const fn new(value: u64) -> Self
    {
        AppDomainId(value)
    }

    pub const fn value(self) -> u64
    {
        self.0
    }
}

/// Identity of a loaded runtime module (the debuggee-side object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeModuleId(u64);

impl RuntimeModuleId
{
    pub const fn new(value: u64) -> Self
    {
        RuntimeModuleId(value)
    }

    pub const fn value(self) -> u64
    {
        self.0
    }
}

/// Identity of the compiled-code region a frame's pc falls in.
///
/// Stands in for whatever pair of code-manager handle and method token the
/// runtime uses internally; the walk only ferries it to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeRegionId(u64);

impl CodeRegionId
{
    pub const fn new(value: u64) -> Self
    {
        CodeRegionId(value)
    }

    pub const fn value(self) -> u64
    {
        self.0
    }
}
