//! Mock filesystem implementations for testing.
//!
//! This module provides `MockFs` and pre-built host scenarios for testing
//! collectors without reading the real `/etc`.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
