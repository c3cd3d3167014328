//! # Kestrel Utilities
//!
//! Shared utilities, logging, and helpers for Kestrel.
//!
//! This crate provides common functionality used across the Kestrel
//! workspace, including production-ready logging infrastructure built on
//! `tracing`.

pub mod logging;

// Re-export commonly used logging functions for convenience
pub use logging::{
    init_file_logging, init_logging, init_logging_with_level, init_test_logging, LogFormat,
    LogLevel,
};
pub use tracing::{debug, error, info, trace, warn};
