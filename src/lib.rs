//! Composable cooperative cancellation and deadline scopes.
//!
//! # Overview
//!
//! A [`CancelScope`] carries "how much time and permission is left" through
//! nested call chains without threading deadlines through every function
//! signature. Entering a scope nests it under whatever scope is active on
//! the current thread; code inside polls [`check`](CancelScope::check) at
//! points of its own choosing and aborts when the scope — or any unshielded
//! ancestor — has been cancelled or has run out its deadline.
//!
//! # Core guarantees
//!
//! - **Cooperative, never preemptive**: nothing is interrupted or injected
//!   at suspension points; cancellation is observable only through `check()`
//! - **Stack discipline**: a scope is activated on creation and deactivated
//!   on drop, on every exit path including panics
//! - **Local attribution**: `check()` always surfaces the polled scope's own
//!   failure value, never an ancestor's
//! - **Shielding**: a shielded scope ignores ancestor state, so cleanup can
//!   run to completion inside an expired operation
//! - **Thread-safe cancellation**: [`CancelHandle`] cancels a scope from any
//!   thread; the flag is mutex-guarded and set-once
//! - **Deterministic testing**: deadlines resolve against an injected
//!   [`TimeSource`], with [`VirtualClock`] for manually advanced time
//!
//! # Module structure
//!
//! - [`scope`]: [`CancelScope`], [`Builder`], [`CancelHandle`], and the
//!   resolution algorithm
//! - [`time`]: [`Time`], [`TimeSource`], [`MonotonicClock`], [`VirtualClock`]
//! - [`error`]: [`Cancelled`], the default failure value
//! - [`tracing_compat`]: feature-gated logging shim
//!
//! # Example
//!
//! ```
//! use cancel_scope::CancelScope;
//! use std::time::Duration;
//!
//! let scope = CancelScope::with_timeout(Duration::from_secs(30));
//! let handle = scope.handle();
//!
//! // Another thread may cancel at any point.
//! let canceller = std::thread::spawn(move || {
//!     handle.cancel();
//! });
//!
//! loop {
//!     if scope.check().is_err() {
//!         break; // cancelled or out of budget
//!     }
//!     std::thread::yield_now();
//! }
//! canceller.join().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::cast_possible_truncation)]

pub mod error;
pub mod scope;
mod stack;
pub mod time;
pub mod tracing_compat;

pub use error::Cancelled;
pub use scope::{Builder, CancelHandle, CancelScope};
pub use time::{MonotonicClock, Time, TimeSource, VirtualClock};
