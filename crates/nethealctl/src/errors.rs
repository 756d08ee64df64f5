//! Exit codes for nethealctl

/// Recovered, healthy, declined, or a read-only command finished
pub const EXIT_SUCCESS: i32 = 0;

/// Recovery failed, was interrupted, or the run could not start
pub const EXIT_FAILURE: i32 = 1;

pub fn exit_code(ok: bool) -> i32 {
    if ok {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}
