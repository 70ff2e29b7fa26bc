//! Cancel scopes and the deadline/cancellation resolution algorithm.
//!
//! A [`CancelScope`] is a node in a hierarchy of cancellation scopes. It
//! fixes an optional absolute deadline at creation, discovers its parent from
//! the ambient per-thread stack (or takes one explicitly), and exposes three
//! operations:
//!
//! - [`timeout`](CancelScope::timeout): the effective remaining budget,
//!   resolved against the ancestor chain
//! - [`check`](CancelScope::check): poll for cancellation at a safe point
//! - [`cancel`](CancelScope::cancel): mark the scope cancelled, from any
//!   thread via a [`CancelHandle`]
//!
//! Cancellation is cooperative. Nothing interrupts running code; a cancelled
//! or expired scope only changes what `check()` reports, and callers decide
//! where to poll and how to abort.
//!
//! # Shielding
//!
//! A shielded scope resolves from its own deadline and flag only, ignoring
//! ancestors. This lets cleanup run to completion inside an operation whose
//! budget has already lapsed. Shielding changes which sources are consulted,
//! never how time passes: the enclosing scope's own `timeout()` still
//! reflects time spent inside a shielded child.

use crate::error::Cancelled;
use crate::stack;
use crate::time::{default_clock, Time, TimeSource};
use crate::tracing_compat::{debug, trace};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Shared per-scope state, reachable from the owning [`CancelScope`], from
/// every descendant's parent chain, and from any [`CancelHandle`].
///
/// Everything here is immutable after construction except the cancelled
/// flag, which transitions false to true at most once under its mutex.
pub(crate) struct ScopeState {
    deadline: Option<Time>,
    shielded: bool,
    cancelled: Mutex<bool>,
    parent: Option<Arc<ScopeState>>,
    clock: Arc<dyn TimeSource>,
}

impl ScopeState {
    pub(crate) fn new(
        deadline: Option<Time>,
        shielded: bool,
        parent: Option<Arc<ScopeState>>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            deadline,
            shielded,
            cancelled: Mutex::new(false),
            parent,
            clock,
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.lock()
    }

    /// Sets the cancelled flag. Returns whether this call made the
    /// transition (false if the scope was already cancelled).
    fn cancel(&self) -> bool {
        let mut cancelled = self.cancelled.lock();
        if *cancelled {
            return false;
        }
        *cancelled = true;
        debug!("scope cancelled");
        true
    }

    /// This scope's own remaining time, ignoring ancestors.
    ///
    /// `None` means unbounded; an elapsed deadline clamps to zero.
    fn local_remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| Duration::from_nanos(deadline.duration_since(self.clock.now())))
    }

    /// Resolves the effective remaining budget against the ancestor chain.
    ///
    /// Walks from `self` towards the root taking the minimum of each visited
    /// scope's local remaining time. The walk stops after visiting a
    /// shielded scope: its own remaining time still counts, its ancestors do
    /// not. Any visited scope that is already cancelled forces the result to
    /// zero. Each flag is read under its own mutex; no two mutexes are ever
    /// held at once.
    fn resolve_remaining(&self) -> Option<Duration> {
        let mut remaining: Option<Duration> = None;
        let mut next = Some(self);
        while let Some(node) = next {
            if node.is_cancelled() {
                return Some(Duration::ZERO);
            }
            remaining = tighter(remaining, node.local_remaining());
            if node.shielded {
                break;
            }
            next = node.parent.as_deref();
        }
        remaining
    }
}

impl fmt::Debug for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeState")
            .field("deadline", &self.deadline)
            .field("shielded", &self.shielded)
            .field("cancelled", &self.is_cancelled())
            .field("has_parent", &self.parent.is_some())
            .finish_non_exhaustive()
    }
}

/// The tighter of two optional budgets, treating `None` as unbounded.
fn tighter(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (x, None) | (None, x) => x,
    }
}

/// A scoped cancellation/deadline guard.
///
/// Creating a scope activates it: the constructor reads the clock, fixes the
/// deadline, captures the current top of this thread's scope stack as its
/// parent, and pushes itself. Dropping the scope deactivates it and restores
/// the previous top, on every exit path including panics.
///
/// The type parameter `E` is the opaque failure value returned by
/// [`check`](Self::check); it defaults to [`Cancelled`].
///
/// # Thread affinity
///
/// A scope created through the ambient stack must be dropped on the thread
/// that entered it; moving it elsewhere before drop unbalances that thread's
/// stack and is a caller error. Scopes built with an explicit parent (or
/// detached) have no such affinity. For cancelling from another thread, take
/// a [`CancelHandle`].
///
/// # Example
///
/// ```
/// use cancel_scope::CancelScope;
/// use std::time::Duration;
///
/// let scope = CancelScope::with_timeout(Duration::from_secs(30));
/// for _item in 0..3 {
///     scope.check()?;
///     // process item
/// }
/// # Ok::<(), cancel_scope::Cancelled>(())
/// ```
#[must_use = "a scope is deactivated as soon as it is dropped"]
pub struct CancelScope<E = Cancelled> {
    state: Arc<ScopeState>,
    failure: E,
    ambient: bool,
}

impl CancelScope<Cancelled> {
    /// Enters a scope with no deadline and the default failure value.
    pub fn enter() -> Self {
        Builder::new().enter()
    }

    /// Enters a scope that expires `timeout` from now.
    ///
    /// A zero duration yields a scope that is expired from birth: its first
    /// [`check`](Self::check) fails.
    pub fn with_timeout(timeout: Duration) -> Self {
        Builder::new().timeout(timeout).enter()
    }

    /// Returns a builder for full control over timeout, shielding, failure
    /// value, clock, and parent discovery.
    pub fn builder() -> Builder {
        Builder::new()
    }
}

impl<E> CancelScope<E> {
    /// Returns the effective remaining budget for this scope.
    ///
    /// `None` means unbounded; `Some(Duration::ZERO)` means the scope has
    /// resolved to cancelled or expired. The answer may shrink between
    /// successive calls as time advances, or drop to zero abruptly when a
    /// concurrent [`cancel`](Self::cancel) lands or an ancestor's deadline
    /// lapses.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.state.resolve_remaining()
    }

    /// Cancels this scope.
    ///
    /// Idempotent; returns whether this call performed the transition.
    /// Unshielded descendants observe the cancellation on their next
    /// [`check`](Self::check) or [`timeout`](Self::timeout).
    pub fn cancel(&self) -> bool {
        self.state.cancel()
    }

    /// Returns whether this scope itself has been cancelled.
    ///
    /// This reads only the local flag; an expired deadline or a cancelled
    /// ancestor does not set it. Use [`check`](Self::check) or
    /// [`timeout`](Self::timeout) for the resolved state.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Returns this scope's absolute deadline, if it has one.
    #[must_use]
    pub fn deadline(&self) -> Option<Time> {
        self.state.deadline
    }

    /// Returns whether this scope is shielded from ancestor state.
    #[must_use]
    pub fn shielded(&self) -> bool {
        self.state.shielded
    }

    /// Returns a clonable handle for cancelling this scope from another
    /// thread, or for parenting an explicit child.
    #[must_use]
    pub fn handle(&self) -> CancelHandle {
        CancelHandle {
            state: self.state.clone(),
        }
    }
}

impl<E: Clone> CancelScope<E> {
    /// Polls for cancellation.
    ///
    /// Fails if and only if [`timeout`](Self::timeout) is zero at the time
    /// of the call, returning a clone of *this* scope's failure value — never
    /// an ancestor's, even when the condition originated there. Callers who
    /// need to attribute a failure to a particular nesting level must poll
    /// the scope at that level.
    ///
    /// This is the sole point where cancellation becomes observable; a
    /// caller that never polls observes no effect at all, even past expiry.
    pub fn check(&self) -> Result<(), E> {
        if self.timeout() == Some(Duration::ZERO) {
            trace!("cancellation observed at check");
            return Err(self.failure.clone());
        }
        Ok(())
    }
}

impl<E> Drop for CancelScope<E> {
    fn drop(&mut self) {
        if self.ambient {
            stack::pop();
            trace!("scope exited");
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for CancelScope<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelScope")
            .field("state", &self.state)
            .field("failure", &self.failure)
            .field("ambient", &self.ambient)
            .finish()
    }
}

/// How a new scope finds its parent.
enum Parent {
    /// Read the top of this thread's scope stack.
    Ambient,
    /// Use the given scope (or none), bypassing the ambient stack.
    Explicit(Option<Arc<ScopeState>>),
}

/// Builder for [`CancelScope`].
///
/// ```
/// use cancel_scope::{CancelScope, Cancelled};
/// use std::time::Duration;
///
/// let scope = CancelScope::builder()
///     .timeout(Duration::from_secs(5))
///     .shield()
///     .failure(Cancelled::with_message("flush aborted"))
///     .enter();
/// assert!(scope.shielded());
/// ```
#[must_use = "the builder does nothing until enter() is called"]
pub struct Builder<E = Cancelled> {
    timeout: Option<Duration>,
    shield: bool,
    failure: E,
    clock: Option<Arc<dyn TimeSource>>,
    parent: Parent,
}

impl Builder<Cancelled> {
    /// Creates a builder with no deadline, no shield, and the default
    /// failure value.
    pub fn new() -> Self {
        Self {
            timeout: None,
            shield: false,
            failure: Cancelled::new(),
            clock: None,
            parent: Parent::Ambient,
        }
    }
}

impl Default for Builder<Cancelled> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Builder<E> {
    /// Sets the relative timeout; the deadline is fixed when the scope is
    /// entered. Zero means expired from birth.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Shields the scope: resolution ignores ancestor deadlines and
    /// cancellation.
    pub fn shield(mut self) -> Self {
        self.shield = true;
        self
    }

    /// Sets the failure value returned by [`check`](CancelScope::check),
    /// replacing the default [`Cancelled`] and changing the scope's type
    /// parameter.
    pub fn failure<F>(self, failure: F) -> Builder<F> {
        Builder {
            timeout: self.timeout,
            shield: self.shield,
            failure,
            clock: self.clock,
            parent: self.parent,
        }
    }

    /// Injects the clock used for the deadline and all resolution reads.
    /// Defaults to the process-wide monotonic clock.
    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Parents the scope on `parent` explicitly instead of the ambient
    /// stack.
    ///
    /// Scopes built this way never touch the thread's scope stack: they are
    /// invisible to ambient parent discovery and their drop is stack-neutral.
    /// This is the explicit-plumbing alternative for callers that avoid
    /// thread-local context (e.g. cooperative tasks migrating across
    /// threads).
    pub fn parent(mut self, parent: &CancelHandle) -> Self {
        self.parent = Parent::Explicit(Some(parent.state.clone()));
        self
    }

    /// Makes the scope a root with no parent, bypassing the ambient stack.
    pub fn detached(mut self) -> Self {
        self.parent = Parent::Explicit(None);
        self
    }

    /// Enters the scope: fixes the deadline, captures the parent, and (for
    /// ambient scopes) pushes onto this thread's scope stack.
    pub fn enter(self) -> CancelScope<E> {
        let clock = self.clock.unwrap_or_else(default_clock);
        let deadline = self.timeout.map(|timeout| clock.now() + timeout);
        let (parent, ambient) = match self.parent {
            Parent::Ambient => (stack::current(), true),
            Parent::Explicit(parent) => (parent, false),
        };
        let state = Arc::new(ScopeState::new(deadline, self.shield, parent, clock));
        trace!(
            deadline = ?state.deadline,
            shielded = state.shielded,
            ambient,
            "scope entered"
        );
        if ambient {
            stack::push(state.clone());
        }
        CancelScope {
            state,
            failure: self.failure,
            ambient,
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for Builder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("timeout", &self.timeout)
            .field("shield", &self.shield)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

/// A clonable, thread-safe reference to a scope's cancellation flag.
///
/// Handles keep the shared node alive, so cancelling after the owning
/// [`CancelScope`] has been dropped is safe: the flag is set and nothing
/// remains to observe it.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<ScopeState>,
}

impl CancelHandle {
    /// Cancels the referenced scope.
    ///
    /// Idempotent; returns whether this call performed the transition. May
    /// be called from any thread; a `check()` on the owning thread observes
    /// the flag as soon as this call returns.
    pub fn cancel(&self) -> bool {
        self.state.cancel()
    }

    /// Returns whether the referenced scope has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("state", &self.state)
            .finish()
    }
}
