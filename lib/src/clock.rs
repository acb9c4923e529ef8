//! Timer tick counter, incremented once per timer interrupt.
//!
//! The timer interrupt itself (PIT/HPET programming, IDT vector wiring) is
//! owned by the driver that programs the hardware; this module only owns
//! the counter it increments.

use core::sync::atomic::{AtomicU64, Ordering};

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Granularity of one tick, matching the PIT's 10ms period.
pub const TICK_MS: u64 = 10;

/// Called by the timer interrupt handler on every tick.
#[inline]
pub fn time_tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Milliseconds elapsed since boot, derived from the tick counter.
#[inline]
pub fn uptime_ms() -> u64 {
    TICKS.load(Ordering::Relaxed) * TICK_MS
}

/// Nanoseconds elapsed since boot, derived from the tick counter.
#[inline]
pub fn monotonic_ns() -> u64 {
    uptime_ms() * 1_000_000
}
