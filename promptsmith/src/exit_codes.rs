//! Stable exit codes for promptsmith CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid input, configuration, or any unclassified failure.
pub const INVALID: i32 = 1;
/// The orchestrator kept violating the call protocol after correction.
pub const PROTOCOL: i32 = 2;
/// A call handler rejected its arguments or the session state.
pub const HANDLER: i32 = 3;
/// A generation backend failed or timed out.
pub const BACKEND: i32 = 4;
