//! The default failure value.
//!
//! The core treats failure values as opaque: [`check`](crate::CancelScope::check)
//! hands back whatever the caller supplied at scope creation, without ever
//! inspecting it. [`Cancelled`] is the convenience default for callers who do
//! not need a domain-specific value.

use thiserror::Error;

/// Failure value surfaced by [`check`](crate::CancelScope::check) when a
/// scope resolves to cancelled or expired.
///
/// Carries an optional static message so nested scopes can attribute a
/// failure to the operation that was polled (messages are `&'static str` for
/// determinism and cheap cloning).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Error)]
#[error("{}", .message.unwrap_or("operation cancelled"))]
pub struct Cancelled {
    message: Option<&'static str>,
}

impl Cancelled {
    /// Creates a cancellation failure with the default message.
    #[must_use]
    pub const fn new() -> Self {
        Self { message: None }
    }

    /// Creates a cancellation failure with a custom static message.
    #[must_use]
    pub const fn with_message(message: &'static str) -> Self {
        Self {
            message: Some(message),
        }
    }

    /// Returns the custom message, if one was supplied.
    #[must_use]
    pub const fn message(&self) -> Option<&'static str> {
        self.message
    }
}
