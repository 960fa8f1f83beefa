//! Deterministic control core for an RTL generate/review/verify loop.
//!
//! An agent proposes hardware sources, a lint tool reviews them, a simulator
//! verifies them against a testbench, and failures flow back to the agent as
//! normalized feedback until the design passes or a ceiling is hit.
//!
//! - **[`core`]**: Pure, deterministic logic (types, transition table, attempt
//!   tracking, run state, verdicts, path safety). No I/O.
//! - **[`normalize`]**: Pure matchers turning tool text into issues and failed cases.
//! - **[`io`]**: Side-effecting collaborators (processes, files, prompts).
//! - **[`stages`]**: One executor per stage, wrapping a collaborator call.
//! - **[`orchestrator`]**: The state machine that sequences the stages.
//! - **[`batch`]**: Runs a dataset of cases through the orchestrator.

pub mod batch;
pub mod core;
pub mod errors;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod normalize;
pub mod orchestrator;
pub mod stages;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
