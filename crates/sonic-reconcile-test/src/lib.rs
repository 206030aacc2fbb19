//! Integration test infrastructure for SONiC reconciliation daemons
//!
//! Provides:
//! - CONFIG_DB change fixtures for FEATURE and BMP rows
//! - A recording command runner with failure and timeout injection
//! - A harness running a daemon in the background against a `MemoryStore`
//! - Verification helpers for issued commands, cache and status rows

pub mod fixtures;
mod runner;
mod verification;

pub use fixtures::*;
pub use runner::RecordingRunner;
pub use verification::*;
