//! Conditional logging macros that check a module-level `ENABLE_LOGS` flag.
//!
//! Usage:
//! ```ignore
//! // In your module, define the flag first:
//! const ENABLE_LOGS: bool = true;
//!
//! // Then use the macros (they're exported at the crate root):
//! use crate::{log_debug, log_error, log_info, log_warn};
//!
//! log_info!("This will log if ENABLE_LOGS is true");
//! ```

use std::env;

use log::LevelFilter;

/// Macro for conditional debug logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Macro for conditional info logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
///
/// Each module that uses this macro must define:
/// ```ignore
/// const ENABLE_LOGS: bool = true; // or false
/// ```
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Macro for conditional warn logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Macro for conditional error logging.
/// Checks the `ENABLE_LOGS` const in the calling module.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

const DEBUG_ENV: &str = "POMODORO_ENGINE_DEBUG";

fn debug_mode() -> bool {
    env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Initialize `env_logger` for the host process (reads `RUST_LOG`).
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let default_level = if debug_mode() {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .try_init();
}
