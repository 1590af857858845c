//! Stable exit codes for patchloop CLI commands.

/// Command succeeded; for `run`, validation passed within the budget.
pub const OK: i32 = 0;
/// Command failed due to invalid layout/config/state or other errors.
pub const INVALID: i32 = 1;
/// `patchloop run` exhausted its iteration budget without validation passing.
pub const EXHAUSTED: i32 = 3;
