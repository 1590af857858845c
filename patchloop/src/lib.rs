//! Iterative plan-and-patch loop for autonomous code modification.
//!
//! This crate drives a bounded loop: ask an external planner for a plan,
//! apply its steps to the project tree, run the validator, and repeat until
//! validation passes or the iteration budget is exhausted. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (plan model, edit application,
//!   run state transitions). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem layout, state and
//!   backup persistence, process execution). Isolated to enable scripted
//!   doubles in tests.
//!
//! Orchestration modules ([`executor`], [`looping`]) coordinate core logic
//! with I/O to implement the run loop and CLI commands.

pub mod core;
pub mod executor;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
