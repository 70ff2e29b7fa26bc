//! Conformance tests for scope resolution, shielding, stack restoration,
//! and cross-thread cancellation.
//!
//! Timing-sensitive behavior runs against [`VirtualClock`] so every assertion
//! is exact: no sleeps, no tolerances.

mod common;

use cancel_scope::{CancelScope, Cancelled, VirtualClock};
use common::*;
use proptest::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

fn virtual_clock() -> Arc<VirtualClock> {
    Arc::new(VirtualClock::new())
}

// ============================================================================
// Budget resolution
// ============================================================================

#[test]
fn unbounded_chain_never_fails() {
    init_test_logging();
    let _outer = CancelScope::enter();
    let _middle = CancelScope::enter();
    let inner = CancelScope::enter();
    assert_eq!(inner.timeout(), None);
    assert!(inner.check().is_ok());
}

#[test]
fn budget_is_exact_and_nonincreasing() {
    init_test_logging();
    let clock = virtual_clock();
    let scope = CancelScope::builder()
        .timeout(secs(3))
        .clock(clock.clone())
        .enter();

    assert_eq!(scope.timeout(), Some(secs(3)));
    clock.advance(SEC / 2);
    assert_eq!(scope.timeout(), Some(Duration::from_millis(2500)));
    clock.advance(3 * SEC);
    assert_eq!(scope.timeout(), Some(Duration::ZERO));
}

#[test]
fn check_fails_exactly_when_budget_is_zero() {
    init_test_logging();
    let clock = virtual_clock();
    let scope = CancelScope::builder()
        .timeout(secs(1))
        .clock(clock.clone())
        .enter();

    clock.advance(SEC - 1);
    assert_ne!(scope.timeout(), Some(Duration::ZERO));
    assert!(scope.check().is_ok());

    clock.advance(1);
    assert_eq!(scope.timeout(), Some(Duration::ZERO));
    assert!(scope.check().is_err());
}

#[test]
fn effective_budget_is_the_minimum_over_the_chain() {
    init_test_logging();
    let clock = virtual_clock();
    let _outer = CancelScope::builder()
        .timeout(secs(5))
        .clock(clock.clone())
        .enter();
    let inner = CancelScope::builder()
        .timeout(secs(20))
        .clock(clock.clone())
        .enter();

    assert_eq!(inner.timeout(), Some(secs(5)));
    clock.advance(4 * SEC);
    assert_eq!(inner.timeout(), Some(secs(1)));
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn cancel_zeroes_unshielded_descendants() {
    init_test_logging();
    let root = CancelScope::enter();
    let middle = CancelScope::enter();
    let leaf = CancelScope::with_timeout(secs(100));

    root.cancel();
    assert_eq!(leaf.timeout(), Some(Duration::ZERO));
    assert!(leaf.check().is_err());
    assert!(middle.check().is_err());
    // Only root's own flag is set; descendants resolve cancelled.
    assert!(root.cancelled());
    assert!(!middle.cancelled());
    assert!(!leaf.cancelled());
}

#[test]
fn cross_thread_cancel_is_observed_after_the_call_returns() {
    init_test_logging();
    let scope = CancelScope::with_timeout(secs(3600));
    let handle = scope.handle();

    let canceller = std::thread::spawn(move || handle.cancel());
    assert!(canceller.join().unwrap());

    assert!(scope.cancelled());
    assert_eq!(scope.timeout(), Some(Duration::ZERO));
    assert!(scope.check().is_err());
}

#[test]
fn cancel_after_drop_is_a_quiet_no_op() {
    init_test_logging();
    let handle = {
        let scope = CancelScope::enter();
        scope.handle()
    };
    assert!(handle.cancel());
    assert!(!handle.cancel());
    assert!(handle.is_cancelled());
}

// ============================================================================
// Shielding
// ============================================================================

#[test]
fn shielded_scope_ignores_ancestor_cancel_and_expiry() {
    init_test_logging();
    let clock = virtual_clock();
    let parent = CancelScope::builder()
        .timeout(secs(1))
        .clock(clock.clone())
        .enter();
    clock.advance(2 * SEC); // parent already expired
    parent.cancel(); // and cancelled, for good measure

    let shielded = CancelScope::builder().shield().clock(clock.clone()).enter();
    assert_eq!(shielded.timeout(), None);
    assert!(shielded.check().is_ok());

    // Direct cancellation still lands.
    shielded.cancel();
    assert!(shielded.check().is_err());
}

#[test]
fn failure_value_is_always_the_polled_scopes_own() {
    init_test_logging();
    let parent = CancelScope::builder()
        .failure(Cancelled::with_message("parent gave up"))
        .enter();
    let child = CancelScope::builder()
        .failure(Cancelled::with_message("child gave up"))
        .enter();

    parent.cancel();
    let err = child.check().unwrap_err();
    assert_eq!(err.message(), Some("child gave up"));
    let err = parent.check().unwrap_err();
    assert_eq!(err.message(), Some("parent gave up"));
}

// ============================================================================
// Stack discipline
// ============================================================================

#[test]
fn normal_exit_restores_the_previous_parent() {
    init_test_logging();
    let clock = virtual_clock();
    let _outer = CancelScope::builder()
        .timeout(secs(10))
        .clock(clock.clone())
        .enter();
    {
        let _inner = CancelScope::builder()
            .timeout(secs(2))
            .clock(clock.clone())
            .enter();
    }
    // If the inner scope had leaked onto the stack, the sibling would
    // inherit its 2s bound instead of the outer 10s.
    let sibling = CancelScope::builder().clock(clock.clone()).enter();
    assert_eq!(sibling.timeout(), Some(secs(10)));
}

#[test]
fn panicking_exit_restores_the_previous_parent() {
    init_test_logging();
    let clock = virtual_clock();
    let _outer = CancelScope::builder()
        .timeout(secs(10))
        .clock(clock.clone())
        .enter();

    let result = catch_unwind(AssertUnwindSafe(|| {
        let _inner = CancelScope::builder()
            .timeout(secs(2))
            .clock(clock.clone())
            .enter();
        panic!("body failed partway through");
    }));
    assert!(result.is_err());

    let sibling = CancelScope::builder().clock(clock.clone()).enter();
    assert_eq!(sibling.timeout(), Some(secs(10)));
}

#[test]
fn fresh_threads_start_with_no_enclosing_scope() {
    init_test_logging();
    let _outer = CancelScope::with_timeout(secs(1));
    let unparented = std::thread::spawn(|| {
        let scope = CancelScope::enter();
        scope.timeout().is_none()
    })
    .join()
    .unwrap();
    assert!(unparented);
}

// ============================================================================
// Concrete scenarios
// ============================================================================

/// Scenario A: a 3s budget polled across two 1s work intervals.
#[test]
fn scenario_a_polling_across_work_intervals() {
    init_test_logging();
    let clock = virtual_clock();
    let s1 = CancelScope::builder()
        .timeout(secs(3))
        .clock(clock.clone())
        .enter();

    clock.advance(SEC); // work for 1s
    assert!(s1.check().is_ok());
    clock.advance(SEC); // work for another 1s
    assert!(s1.check().is_ok());

    assert_eq!(s1.timeout(), Some(secs(1)));
}

/// Scenario B: shielded cleanup overruns the enclosing budget; the clock
/// keeps charging the parent while the shield holds.
#[test]
fn scenario_b_shielded_overrun_expires_the_parent() {
    init_test_logging();
    let clock = virtual_clock();
    let s1 = CancelScope::builder()
        .timeout(secs(3))
        .clock(clock.clone())
        .enter();
    clock.advance(2 * SEC); // 1s of budget left

    {
        let s2 = CancelScope::builder().shield().clock(clock.clone()).enter();
        clock.advance(2 * SEC); // cleanup runs 1s past s1's budget
        assert!(s2.check().is_ok());
        assert_eq!(s2.timeout(), None);
    }

    assert_eq!(s1.timeout(), Some(Duration::ZERO));
    let follow_up = CancelScope::builder().clock(clock.clone()).enter();
    assert!(follow_up.check().is_err());
}

/// Scenario C: cancel the parent, let shielded cleanup finish, then watch
/// the next unshielded child fail with its own failure value.
#[test]
fn scenario_c_cancel_shield_then_fail_with_local_value() {
    init_test_logging();
    let parent = CancelScope::enter();

    {
        let c1 = CancelScope::enter();
        assert!(c1.check().is_ok());
    }

    parent.cancel();

    {
        let c2 = CancelScope::builder().shield().enter();
        assert!(c2.check().is_ok());
        assert_eq!(c2.timeout(), None);
    }

    let c3 = CancelScope::builder()
        .failure(Cancelled::with_message("c3 aborted"))
        .enter();
    let err = c3.check().unwrap_err();
    assert_eq!(err.message(), Some("c3 aborted"));
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// `timeout()` never increases as virtual time advances.
    #[test]
    fn budget_is_monotonically_nonincreasing(
        budget_ms in 1u64..10_000,
        steps in proptest::collection::vec(0u64..5_000, 1..20),
    ) {
        let clock = virtual_clock();
        let scope = CancelScope::builder()
            .timeout(Duration::from_millis(budget_ms))
            .clock(clock.clone())
            .enter();

        let mut prev = scope.timeout().unwrap();
        for step_ms in steps {
            clock.advance(step_ms * 1_000_000);
            let current = scope.timeout().unwrap();
            prop_assert!(current <= prev);
            prop_assert_eq!(scope.check().is_err(), current == Duration::ZERO);
            prev = current;
        }
    }
}
