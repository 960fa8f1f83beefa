//! Deterministic, pure logic shared by the flow core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod attempts;
pub mod paths;
pub mod state;
pub mod transitions;
pub mod types;
pub mod verdict;
