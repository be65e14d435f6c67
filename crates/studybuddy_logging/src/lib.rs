#![deny(missing_docs)]
//! Shared logging utilities for the Study Buddy workspace.
//!
//! This crate provides the `sb_*` logging macros used across the codebase
//! and a minimal test initializer for the global logger. The macros expand
//! through the re-exported [`log`] crate, so callers do not need their own
//! `log` dependency.

#[doc(hidden)]
pub use log;

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! sb_trace {
    ($($arg:tt)*) => {{
        $crate::log::trace!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! sb_debug {
    ($($arg:tt)*) => {{
        $crate::log::debug!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! sb_info {
    ($($arg:tt)*) => {{
        $crate::log::info!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! sb_warn {
    ($($arg:tt)*) => {{
        $crate::log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! sb_error {
    ($($arg:tt)*) => {{
        $crate::log::error!($($arg)*);
    }};
}

/// Initializes a simple terminal logger for use in tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
