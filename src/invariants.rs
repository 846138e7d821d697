//! Debug assertion macros for the protocol invariants described in
//! `SPEC_FULL.md`.
//!
//! These are only active in debug builds (`debug_assert!`), so there is no
//! overhead in release builds. They exist to catch protocol violations
//! during development rather than to handle them at runtime.

// =============================================================================
// INV-SEQ-01: reassembly domain
// =============================================================================

/// Assert that a result index handed back from a worker falls inside the
/// range that has actually been dispatched but not yet yielded.
macro_rules! debug_assert_reorder_domain {
    ($idx:expr, $n_done:expr, $n_injected:expr) => {
        debug_assert!(
            $idx >= $n_done && $idx < $n_injected,
            "INV-SEQ-01 violated: result index {} outside dispatched range [{}, {})",
            $idx,
            $n_done,
            $n_injected
        )
    };
}

// =============================================================================
// INV-RING-01: ring offset bounds
// =============================================================================

/// Assert that a ring offset stays within the truncated buffer length.
macro_rules! debug_assert_ring_bounds {
    ($offset:expr, $ring_len:expr) => {
        debug_assert!(
            $offset < $ring_len,
            "INV-RING-01 violated: ring offset {} outside [0, {})",
            $offset,
            $ring_len
        )
    };
}

// =============================================================================
// INV-RING-02: initial write permit
// =============================================================================

/// Assert that the loader thread's first write-permit acquisition does not
/// block, since the ring starts with every chunk writable.
macro_rules! debug_assert_initial_wsem_available {
    ($acquired:expr) => {
        debug_assert!(
            $acquired,
            "INV-RING-02 violated: initial write-permit acquisition must not block"
        )
    };
}

pub(crate) use debug_assert_initial_wsem_available;
pub(crate) use debug_assert_reorder_domain;
pub(crate) use debug_assert_ring_bounds;
