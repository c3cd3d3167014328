//! # Engine Configuration
//!
//! Tuning knobs for the thread protocols and the stackwalk, plus the
//! architecture profile the walk classifies under.
//!
//! The timing defaults reproduce the protocol shape the engine was tuned
//! with: a short first wait, steadier repolls, and a bounded retry count.
//! Embedders may change the numbers; the shape is the contract.

use std::time::Duration;

/// Timing of the lock-canary probe protocol.
#[derive(Debug, Clone, Copy)]
pub struct CanaryConfig
{
    /// How long the first wait for a probe answer lasts.
    pub first_wait: Duration,
    /// How long each repoll after the first wait lasts.
    pub steady_wait: Duration,
    /// How many repolls before the canary is declared stuck.
    pub max_retries: u32,
}

impl Default for CanaryConfig
{
    fn default() -> Self
    {
        CanaryConfig {
            first_wait: Duration::from_millis(80),
            steady_wait: Duration::from_millis(150),
            max_retries: 15,
        }
    }
}

/// Timing of the helper thread's main loop.
#[derive(Debug, Clone, Copy)]
pub struct HelperLoopConfig
{
    /// Wait timeout while a cooperative suspension is in progress. Each
    /// expiry triggers one sweep over the thread store.
    pub sync_poll_interval: Duration,
}

impl Default for HelperLoopConfig
{
    fn default() -> Self
    {
        HelperLoopConfig {
            sync_poll_interval: Duration::from_millis(20),
        }
    }
}

/// Behavior switches for the stackwalk driver.
#[derive(Debug, Clone, Copy)]
pub struct WalkConfig
{
    /// Drop an unmanaged chain when no exit frame anchored it and the
    /// consumer is neither at its leaf callback nor ignoring non-method
    /// frames. On by default; consumers that want every chain can turn
    /// it off.
    pub suppress_unanchored_chains: bool,
}

impl Default for WalkConfig
{
    fn default() -> Self
    {
        WalkConfig {
            suppress_unanchored_chains: true,
        }
    }
}

/// Exception-handling model of the target architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EhModel
{
    /// Handlers compile to funclets reported as separate frames; the
    /// walk collapses each non-filter funclet into its parent.
    Funclets,
    /// Chained x86 exception handling; no funclet bookkeeping.
    X86Chained,
}

/// Architecture facts the walk driver classifies under.
#[derive(Debug, Clone, Copy)]
pub struct ArchProfile
{
    pub eh: EhModel,
    /// Native pointer width in bytes; used to manufacture chain
    /// boundaries one slot leafward of a frame.
    pub pointer_width: u64,
    /// Whether one unwind step always moves the stack pointer rootward.
    /// The walk's progress assertion is only valid when it does.
    pub monotonic_unwind: bool,
    /// Strip the Thumb interworking bit from code offsets.
    pub strip_thumb_bit: bool,
}

impl ArchProfile
{
    /// 64-bit funclet architecture (x86-64 shape). The default.
    pub const fn funclets() -> Self
    {
        ArchProfile {
            eh: EhModel::Funclets,
            pointer_width: 8,
            monotonic_unwind: true,
            strip_thumb_bit: false,
        }
    }

    /// 32-bit x86 with chained exception handling.
    pub const fn x86_chained() -> Self
    {
        ArchProfile {
            eh: EhModel::X86Chained,
            pointer_width: 4,
            monotonic_unwind: true,
            strip_thumb_bit: false,
        }
    }

    /// 64-bit ARM; funclets, but unwinding may keep the stack pointer.
    pub const fn arm64() -> Self
    {
        ArchProfile {
            eh: EhModel::Funclets,
            pointer_width: 8,
            monotonic_unwind: false,
            strip_thumb_bit: false,
        }
    }

    /// 32-bit ARM; Thumb code offsets carry the interworking bit.
    pub const fn arm() -> Self
    {
        ArchProfile {
            eh: EhModel::Funclets,
            pointer_width: 4,
            monotonic_unwind: false,
            strip_thumb_bit: true,
        }
    }

    /// Does this profile track funclet parentage?
    pub const fn has_funclets(&self) -> bool
    {
        matches!(self.eh, EhModel::Funclets)
    }
}

impl Default for ArchProfile
{
    fn default() -> Self
    {
        Self::funclets()
    }
}
