//! Deterministic, pure logic shared by the patchloop core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod diff;
pub mod patch;
pub mod plan;
pub mod state;
