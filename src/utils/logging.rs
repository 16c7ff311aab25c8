//! Logging macros gated on a module-level `ENABLE_LOGS` flag, so noisy modules
//! (the auto-read loop, the acquisition path) can be silenced individually
//! without touching `RUST_LOG`.
//!
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_info, log_warn};
//!
//! log_info!("Auto-read monitor started");
//! ```

/// `log::info!` gated on the caller's `ENABLE_LOGS`. Used for auto-read toggles,
/// card detection and removal, and monitor start and stop.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            ::log::info!($($arg)*);
        }
    };
}

/// `log::warn!` gated on the caller's `ENABLE_LOGS`. Used when a card read leaves
/// fields unread.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            ::log::warn!($($arg)*);
        }
    };
}

/// `log::error!` gated on the caller's `ENABLE_LOGS`. Used for failed auto-reads and
/// records that were read but could not be saved.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            ::log::error!($($arg)*);
        }
    };
}
