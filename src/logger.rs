//! Structured logging system with visual formatting.
//!
//! Output is written line by line to stdout using the box-drawing layout below.
//! Every group worker logs through the same sink, so a whole line is written
//! under a single stdout lock to keep concurrent groups from interleaving.
//!
//! The logger supports runtime enable/disable so one-shot control commands and
//! tests can run quietly.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);

/// Main logging interface.
///
/// ## Logging Conventions
///
/// - **`log_block_start!`**: opens a new conceptual block (daemon startup,
///   configuration reload, group start). Prints an empty `┃` line followed by `┣ message`.
/// - **`log_decorated!`**: a line inside the current block, `┣ message`.
/// - **`log_indented!`**: nested detail under the previous line, `┃   message`.
/// - **`log_pipe!`**: a lone `┃` for spacing before a semantic message.
/// - **`log_version!`** / **`log_end!`**: header and final marker, once per process.
/// - **`log_info!`, `log_warning!`, `log_error!`, `log_debug!`, `log_critical!`**:
///   semantic messages with a colored `[LEVEL]` tag.
pub struct Log;

impl Log {
    /// Enable or disable logging.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }

    /// Timestamp prefix shown while the process clock is simulated.
    ///
    /// Real-time runs leave the prefix empty; the terminal or journal already
    /// stamps every line.
    pub fn get_timestamp_prefix() -> String {
        if crate::time_source::is_initialized() && crate::time_source::is_simulated() {
            let now = crate::time_source::now();
            format!("[{}] ", now.format("%H:%M:%S"))
        } else {
            String::new()
        }
    }
}

/// Write a fully formatted line to stdout.
pub fn write_output(text: &str) {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    let _ = handle.write_all(text.as_bytes());
    let _ = handle.flush();
}

// # Logging Macros

#[doc(hidden)]
#[macro_export]
macro_rules! __log_line {
    ($lead:expr, $($arg:tt)+) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let prefix = Log::get_timestamp_prefix();
            let message = format!($($arg)+);
            let formatted = format!("{prefix}{}{message}\n", $lead);
            $crate::logger::write_output(&formatted);
        }
    }};
}

/// Log a decorated message as part of an existing block.
#[macro_export]
macro_rules! log_decorated {
    ($($arg:tt)+) => {
        $crate::__log_line!("┣ ", $($arg)+)
    };
}

/// Log an indented message for sub-items or details within a block.
#[macro_export]
macro_rules! log_indented {
    ($($arg:tt)+) => {
        $crate::__log_line!("┃   ", $($arg)+)
    };
}

/// Log a visual pipe separator for vertical spacing.
#[macro_export]
macro_rules! log_pipe {
    () => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let prefix = Log::get_timestamp_prefix();
            $crate::logger::write_output(&format!("{prefix}┃\n"));
        }
    }};
}

/// Log a block start message, initiating a new conceptual block of information.
#[macro_export]
macro_rules! log_block_start {
    ($($arg:tt)+) => {{
        $crate::log_pipe!();
        $crate::__log_line!("┣ ", $($arg)+)
    }};
}

/// Log the application version header.
#[macro_export]
macro_rules! log_version {
    () => {
        $crate::__log_line!("", "┏ lumaflow v{} ━━╸", env!("CARGO_PKG_VERSION"))
    };
}

/// Log the final termination marker.
#[macro_export]
macro_rules! log_end {
    () => {
        $crate::__log_line!("", "╹")
    };
}

/// Log a warning message with yellow-colored level tag.
#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)+) => {
        $crate::__log_line!("┣[\x1b[33mWARNING\x1b[0m] ", $($arg)+)
    };
}

/// Log an error message with red-colored level tag.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => {
        $crate::__log_line!("┣[\x1b[31mERROR\x1b[0m] ", $($arg)+)
    };
}

/// Log an error that terminates the current flow, closing the block with `┗`.
#[macro_export]
macro_rules! log_error_exit {
    ($($arg:tt)+) => {{
        $crate::log_pipe!();
        $crate::__log_line!("┗[\x1b[31mERROR\x1b[0m] ", $($arg)+)
    }};
}

/// Log an informational message with green-colored level tag.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => {
        $crate::__log_line!("┣[\x1b[32mINFO\x1b[0m] ", $($arg)+)
    };
}

/// Log a debug/operational message.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => {
        $crate::__log_line!("┣[\x1b[32mDEBUG\x1b[0m] ", $($arg)+)
    };
}

/// Log a critical message with red-colored level tag.
#[macro_export]
macro_rules! log_critical {
    ($($arg:tt)+) => {
        $crate::__log_line!("┣[\x1b[31mCRITICAL\x1b[0m] ", $($arg)+)
    };
}
