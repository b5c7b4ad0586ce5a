//! Debug-only invariant checks, one per testable property in `spec.md` §8.
//!
//! Compiled out entirely in release builds, matching the teacher's
//! `invariants.rs`: these are development-time tripwires, not runtime
//! error handling.

/// P3: one free byte always separates producer from consumer, and
/// `used + free + 1 == ring_buf_size`.
#[cfg(debug_assertions)]
macro_rules! debug_assert_one_free_byte {
    ($used:expr, $free:expr, $ring_buf_size:expr) => {
        debug_assert!(
            $free >= 1 && $used + $free + 1 == $ring_buf_size,
            "P3 violated: used={} free={} ring_buf_size={}",
            $used,
            $free,
            $ring_buf_size
        );
    };
}

#[cfg(not(debug_assertions))]
macro_rules! debug_assert_one_free_byte {
    ($used:expr, $free:expr, $ring_buf_size:expr) => {};
}

/// P4: the preempt gate is exclusive — observing a nonzero prior value
/// means a nested record call is in flight and must abort, never proceed.
#[cfg(debug_assertions)]
macro_rules! debug_assert_preempt_gate_held {
    ($prior:expr) => {
        debug_assert!($prior == 0, "P4 violated: preempt gate was already held (prior={})", $prior);
    };
}

#[cfg(not(debug_assertions))]
macro_rules! debug_assert_preempt_gate_held {
    ($prior:expr) => {};
}

/// P1/framing precondition: head and tail must stay within `[0, ring_buf_size)`.
#[cfg(debug_assertions)]
macro_rules! debug_assert_in_bounds {
    ($value:expr, $ring_buf_size:expr) => {
        debug_assert!(
            ($value as usize) < $ring_buf_size,
            "index {} out of bounds for ring_buf_size {}",
            $value,
            $ring_buf_size
        );
    };
}

#[cfg(not(debug_assertions))]
macro_rules! debug_assert_in_bounds {
    ($value:expr, $ring_buf_size:expr) => {};
}

/// §7 "corrupt filler output": the filler must consume exactly as many
/// parameters as it was told to produce.
#[cfg(debug_assertions)]
macro_rules! debug_assert_filler_consumed_all_params {
    ($written:expr, $nparams:expr) => {
        debug_assert!(
            $written == $nparams,
            "filler wrote {} params, expected {}",
            $written,
            $nparams
        );
    };
}

#[cfg(not(debug_assertions))]
macro_rules! debug_assert_filler_consumed_all_params {
    ($written:expr, $nparams:expr) => {};
}

/// P7: a consumer must never be reachable from the registry once it has
/// been dropped — this macro checks the complementary fact at the call
/// site, that a reference obtained before teardown is still the one being
/// used (no use-after-GC).
#[cfg(debug_assertions)]
macro_rules! debug_assert_rings_closed_before_free {
    ($rings_open:expr) => {
        debug_assert!(
            $rings_open == 0,
            "P7 violated: consumer freed with {} ring(s) still open",
            $rings_open
        );
    };
}

#[cfg(not(debug_assertions))]
macro_rules! debug_assert_rings_closed_before_free {
    ($rings_open:expr) => {};
}

pub(crate) use debug_assert_filler_consumed_all_params;
pub(crate) use debug_assert_in_bounds;
pub(crate) use debug_assert_one_free_byte;
pub(crate) use debug_assert_preempt_gate_held;
pub(crate) use debug_assert_rings_closed_before_free;
