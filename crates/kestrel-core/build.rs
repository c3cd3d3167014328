//! Build script for kestrel-core
//!
//! Checks the toolchain before compilation:
//! - Minimum Rust version (1.70.0)
//!
//! ## Requirements
//!
//! - **Rust**: 1.70.0 or newer (Edition 2021 plus `std::hint::black_box`)
//! - **Linux / macOS**: libc with per-thread id support (gettid /
//!   pthread_threadid_np); no other system requirements.

fn main()
{
    // Check minimum Rust version
    if let Ok(rustc_version) = rustc_version::version() {
        let min_rust_version = rustc_version::Version::parse("1.70.0").unwrap();

        if rustc_version < min_rust_version {
            panic!(
                "kestrel-core requires Rust {} or newer, found {}",
                min_rust_version, rustc_version
            );
        }
    } else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
    }
}
