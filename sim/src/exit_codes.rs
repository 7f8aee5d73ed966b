//! Process exit codes for `sim` commands.

use crate::simulate::Stop;

/// Command succeeded; `sim run` finished every configured week.
pub const OK: i32 = 0;
/// Bad config, state or export, or any error before the first turn.
pub const INVALID: i32 = 1;
/// A turn failed part-way; the crash record is in the diary and export.
pub const CRASHED: i32 = 2;
/// Ctrl-C stopped the run at a turn boundary.
pub const INTERRUPTED: i32 = 3;

/// Exit code for how a run stopped.
pub fn for_stop(stop: &Stop) -> i32 {
    match stop {
        Stop::Completed => OK,
        Stop::Crashed(_) => CRASHED,
        Stop::Interrupted => INTERRUPTED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_map_to_distinct_codes() {
        assert_eq!(for_stop(&Stop::Completed), OK);
        assert_eq!(for_stop(&Stop::Crashed("boom".to_string())), CRASHED);
        assert_eq!(for_stop(&Stop::Interrupted), INTERRUPTED);
    }
}
