//! CMOS real-time clock read (`SPEC_FULL.md` §4.8, grounded on
//! `original_source/kern/time.c`'s register layout).
//!
//! Read once at boot to seed the kernel's epoch base; not consulted again
//! afterwards (the kernel tick counter in `chronos_lib::clock` tracks
//! elapsed time from there).

use chronos_abi::time::RtcDate;
use chronos_lib::io::Port;

const CMOS_PORT: Port<u8> = Port::new(0x70);
const CMOS_DATA: Port<u8> = Port::new(0x71);

const REG_SECONDS: u8 = 0x00;
const REG_MINUTES: u8 = 0x02;
const REG_HOURS: u8 = 0x04;
const REG_DAY: u8 = 0x07;
const REG_MONTH: u8 = 0x08;
const REG_YEAR: u8 = 0x09;
const REG_STATUS_A: u8 = 0x0A;
const STATUS_A_UPDATE_IN_PROGRESS: u8 = 0x80;

fn cmos_read_register(reg: u8) -> u8 {
    // SAFETY: CMOS_PORT/CMOS_DATA are the fixed, well-known CMOS RTC I/O
    // ports; selecting a register then reading its data has no side
    // effect beyond the read itself.
    unsafe {
        CMOS_PORT.write(reg);
        CMOS_DATA.read()
    }
}

fn update_in_progress() -> bool {
    cmos_read_register(REG_STATUS_A) & STATUS_A_UPDATE_IN_PROGRESS != 0
}

fn bcd_to_binary(v: u8) -> u8 {
    (v & 0x0F) + ((v >> 4) * 10)
}

/// Poll until the RTC is not mid-update, then read all six fields. The
/// single re-read (rather than a retry loop) matches the teacher's
/// single-shot register-access convention elsewhere in this crate
/// (`serial.rs`'s `serial_poll_receive`).
pub fn read_rtc() -> RtcDate {
    while update_in_progress() {
        core::hint::spin_loop();
    }
    RtcDate {
        second: bcd_to_binary(cmos_read_register(REG_SECONDS)),
        minute: bcd_to_binary(cmos_read_register(REG_MINUTES)),
        hour: bcd_to_binary(cmos_read_register(REG_HOURS)),
        day: bcd_to_binary(cmos_read_register(REG_DAY)),
        month: bcd_to_binary(cmos_read_register(REG_MONTH)),
        year: 2000 + bcd_to_binary(cmos_read_register(REG_YEAR)) as u16,
    }
}
