//! Crate-internal logging.
//!
//! With the `logging` feature every level forwards to `tracing` under the
//! `chan_rpc` target. Without it errors still reach stderr; the other levels
//! only type-check their arguments and compile to nothing.

#![allow(unused_macros)]

#[cfg(feature = "logging")]
mod levels {
    macro_rules! log_error {
        ($($arg:tt)*) => { tracing::error!(target: "chan_rpc", $($arg)*) };
    }

    macro_rules! log_warn {
        ($($arg:tt)*) => { tracing::warn!(target: "chan_rpc", $($arg)*) };
    }

    macro_rules! log_info {
        ($($arg:tt)*) => { tracing::info!(target: "chan_rpc", $($arg)*) };
    }

    macro_rules! log_debug {
        ($($arg:tt)*) => { tracing::debug!(target: "chan_rpc", $($arg)*) };
    }

    pub(crate) use log_debug;
    pub(crate) use log_error;
    pub(crate) use log_info;
    pub(crate) use log_warn;
}

#[cfg(not(feature = "logging"))]
mod levels {
    macro_rules! log_error {
        ($($arg:tt)*) => { eprintln!("chan_rpc: {}", format_args!($($arg)*)) };
    }

    // Arguments are never evaluated; they only count as used
    macro_rules! log_warn {
        ($($arg:tt)*) => {{
            if false {
                let _ = format!($($arg)*);
            }
        }};
    }

    macro_rules! log_info {
        ($($arg:tt)*) => {{
            if false {
                let _ = format!($($arg)*);
            }
        }};
    }

    macro_rules! log_debug {
        ($($arg:tt)*) => {{
            if false {
                let _ = format!($($arg)*);
            }
        }};
    }

    pub(crate) use log_debug;
    pub(crate) use log_error;
    pub(crate) use log_info;
    pub(crate) use log_warn;
}

pub(crate) use levels::{log_debug, log_error, log_info, log_warn};
