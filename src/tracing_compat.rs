//! Logging shim over the `tracing` crate.
//!
//! Scope lifecycle events (enter, cancel, failed checks) are emitted through
//! the macros re-exported here. With the `tracing-integration` feature they
//! are the real `tracing` macros; without it they expand to nothing, so the
//! default build carries no logging dependency or runtime cost.

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, trace};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    /// No-op trace-level logging macro.
    #[macro_export]
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    /// No-op debug-level logging macro.
    #[macro_export]
    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    pub use crate::{debug, trace};
}

#[cfg(not(feature = "tracing-integration"))]
pub use noop::*;
