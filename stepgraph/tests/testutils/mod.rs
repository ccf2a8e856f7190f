//! Test utilities for StepGraph integration tests
//!
//! Provides a recording loader backed by an in-memory table and a logging
//! initializer shared by every test binary.

#[allow(dead_code)]
pub mod recording_loader;

/// Initialize env_logger once per test binary; RUST_LOG controls verbosity
#[allow(dead_code)]
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
