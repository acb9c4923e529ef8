//! Kernel time base for the `time_msec` syscall (`spec.md` §4.3,
//! `SPEC_FULL.md` §4.8).
//!
//! The RTC is read exactly once, at boot, to seed an epoch offset; from
//! then on the clock advances purely from `chronos_lib::clock`'s tick
//! counter, matching the teacher's "read hardware once, trust software
//! counters after" convention used by `chronos_mm`'s HHDM init.

use core::sync::atomic::{AtomicI64, Ordering};

static EPOCH_BASE_MS: AtomicI64 = AtomicI64::new(0);

/// Seed the epoch base from the CMOS RTC. Call once during kernel init.
pub fn init() {
    let date = chronos_drivers::rtc::read_rtc();
    let secs = chronos_abi::time::rtcdate_to_time(&date);
    EPOCH_BASE_MS.store(secs.saturating_mul(1000), Ordering::Release);
}

/// Milliseconds since 2000-01-01T00:00:00, as served by the `time_msec`
/// syscall.
pub fn now_ms() -> i64 {
    let base = EPOCH_BASE_MS.load(Ordering::Acquire);
    base.saturating_add(chronos_lib::clock::uptime_ms() as i64)
}
