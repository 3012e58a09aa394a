/// Exit codes for scripts and CI.
pub const SUCCESS: i32 = 0;
pub const RUN_FAILED: i32 = 1;
pub const USAGE_ERROR: i32 = 2;
pub const RUNTIME_ERROR: i32 = 4;
