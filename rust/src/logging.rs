//! Logging macros for the CPM engine with verbosity level control.
//!
//! Output goes to stderr and costs nothing when verbosity is 0.
//! Levels:
//! - 0: SILENT (nothing; failures are reported through `CpmStats`)
//! - 1: STAGES (state transitions, run summary)
//! - 2: TASKS (per-task decisions, validation findings, date errors)
//! - 3: DEBUG (iteration internals of the forward and backward passes)

/// Verbosity level constants.
pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_STAGES: u8 = 1;
pub const VERBOSITY_TASKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Log at STAGES level (verbosity >= 1).
#[macro_export]
macro_rules! log_stage {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_STAGES {
            eprintln!("[cpm] {}", format_args!($($arg)*));
        }
    };
}

/// Log at TASKS level (verbosity >= 2).
///
/// Used for: constraint clamps, dropped dependencies, task-scoped date errors.
#[macro_export]
macro_rules! log_task {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_TASKS {
            eprintln!("[cpm]   {}", format_args!($($arg)*));
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            eprintln!("[cpm]     {}", format_args!($($arg)*));
        }
    };
}
