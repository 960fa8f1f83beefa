//! Stable exit codes for the `rtlloop` CLI.

use crate::core::types::RunStatus;

/// Command succeeded, or the run passed verification.
pub const OK: i32 = 0;
/// Invalid input, config, or other setup error.
pub const INVALID: i32 = 1;
/// The run ended on an attempt or round ceiling.
pub const FAILED: i32 = 2;
/// A collaborator failure or contract violation aborted the run.
pub const ABORTED: i32 = 3;

pub fn for_status(status: RunStatus) -> i32 {
    match status {
        RunStatus::Succeeded => OK,
        RunStatus::Failed => FAILED,
        RunStatus::Aborted => ABORTED,
    }
}
