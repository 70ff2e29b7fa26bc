//! The ambient per-thread scope stack.
//!
//! Each OS thread owns an independent stack of the scopes currently active
//! on it. The stack exists for exactly two moments in a scope's life: at
//! creation, when the top is read to become the new scope's parent, and at
//! drop, when the top is popped to restore the previous scope. Resolution
//! reads never touch the stack; they follow the parent links captured at
//! creation.
//!
//! Pairing is structural: [`CancelScope`](crate::CancelScope) pushes in its
//! constructor and pops in `Drop`, so a pop without a matching push cannot be
//! expressed through the public API.

use crate::scope::ScopeState;
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<Arc<ScopeState>>> = const { RefCell::new(Vec::new()) };
}

/// Returns the scope on top of this thread's stack, if any.
pub(crate) fn current() -> Option<Arc<ScopeState>> {
    SCOPE_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Pushes a scope as the new top of this thread's stack.
pub(crate) fn push(state: Arc<ScopeState>) {
    SCOPE_STACK.with(|stack| stack.borrow_mut().push(state));
}

/// Pops the top of this thread's stack.
pub(crate) fn pop() {
    SCOPE_STACK.with(|stack| {
        stack.borrow_mut().pop();
    });
}

#[cfg(test)]
pub(crate) fn depth() -> usize {
    SCOPE_STACK.with(|stack| stack.borrow().len())
}
