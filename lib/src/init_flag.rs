//! Tiny atomic flags for one-shot and reentrancy-guard initialization.
//!
//! [`InitFlag`] marks a "has this run yet" boolean that is set once and
//! never cleared; [`init_once`] additionally tells the caller whether *it*
//! was the one to claim the transition, which subsystem init functions use
//! to skip re-running setup on a second call. [`StateFlag`] is the same
//! atomic boolean without the one-shot framing, for guards that toggle
//! back and forth (entering/leaving a section, marking a test run seen).
//!
//! [`init_once`]: InitFlag::init_once

use core::sync::atomic::{AtomicBool, Ordering};

/// A boolean that starts false and is meant to be set exactly once.
pub struct InitFlag {
    set: AtomicBool,
}

impl InitFlag {
    #[inline]
    pub const fn new() -> Self {
        Self {
            set: AtomicBool::new(false),
        }
    }

    /// Mark the flag set. Idempotent.
    #[inline]
    pub fn mark_set(&self) {
        self.set.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// A relaxed-ordering read for hot paths that don't need the flag's
    /// set to be visible before any other write the caller cares about.
    #[inline]
    pub fn is_set_relaxed(&self) -> bool {
        self.set.load(Ordering::Relaxed)
    }

    /// Claim the false-to-true transition. Returns `true` only for the
    /// single caller that wins the race; everyone else (including anyone
    /// calling after the flag is already set) gets `false`.
    #[inline]
    pub fn init_once(&self) -> bool {
        self.set
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn clear(&self) {
        self.set.store(false, Ordering::Release);
    }
}

impl Default for InitFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// A boolean flag meant to be toggled repeatedly rather than set once.
pub struct StateFlag {
    active: AtomicBool,
}

impl StateFlag {
    #[inline]
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn set_active(&self) {
        self.active.store(true, Ordering::Release);
    }

    #[inline]
    pub fn set_inactive(&self) {
        self.active.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Try to enter a guarded section: succeeds (returns `true`) only if
    /// the flag was inactive, and leaves it active for the caller to
    /// release with [`leave`](Self::leave).
    #[inline]
    pub fn enter(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn leave(&self) {
        self.active.store(false, Ordering::Release);
    }
}

impl Default for StateFlag {
    fn default() -> Self {
        Self::new()
    }
}
