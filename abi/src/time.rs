//! RTC date conversion and `@<time-spec>` path-suffix parsing (`spec.md`
//! §4.7, §4.8, §8).
//!
//! This module is pure arithmetic/parsing with no hardware access — reading
//! the CMOS registers themselves is a driver concern (`chronos-drivers`).
//! Keeping the conversion and parsing logic here, alongside the wire types,
//! lets both the kernel and `chronos-userland` share one implementation and
//! lets it be exercised with ordinary host `#[cfg(test)]` tests even though
//! the crate is `#![no_std]`.

/// A real-time-clock reading, BCD already decoded to binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtcDate {
    pub second: u8,
    pub minute: u8,
    pub hour: u8,
    pub day: u8,
    pub month: u8,
    pub year: u16,
}

const DAYS_PER_MONTH: [i64; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

#[inline]
fn is_leap_year(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i64, month: i64) -> i64 {
    if month == 2 && is_leap_year(year) {
        29
    } else {
        DAYS_PER_MONTH[(month - 1) as usize]
    }
}

/// Seconds since `2000-01-01T00:00:00`. Inverse of [`time_to_rtcdate`].
pub fn rtcdate_to_time(date: &RtcDate) -> i64 {
    let mut days: i64 = 0;
    for y in 2000..date.year as i64 {
        days += if is_leap_year(y) { 366 } else { 365 };
    }
    for m in 1..date.month as i64 {
        days += days_in_month(date.year as i64, m);
    }
    days += date.day as i64 - 1;

    days * 86_400 + date.hour as i64 * 3_600 + date.minute as i64 * 60 + date.second as i64
}

/// Inverse of [`rtcdate_to_time`]: seconds since the epoch back to an
/// [`RtcDate`].
pub fn time_to_rtcdate(mut secs: i64) -> RtcDate {
    if secs < 0 {
        secs = 0;
    }
    let second = (secs % 60) as u8;
    secs /= 60;
    let minute = (secs % 60) as u8;
    secs /= 60;
    let hour = (secs % 24) as u8;
    let mut days = secs / 24;

    let mut year: i64 = 2000;
    loop {
        let year_days = if is_leap_year(year) { 366 } else { 365 };
        if days < year_days {
            break;
        }
        days -= year_days;
        year += 1;
    }

    let mut month: i64 = 1;
    loop {
        let md = days_in_month(year, month);
        if days < md {
            break;
        }
        days -= md;
        month += 1;
    }

    RtcDate {
        second,
        minute,
        hour,
        day: (days + 1) as u8,
        month: month as u8,
        year: year as u16,
    }
}

/// A resolved `@<time-spec>` path suffix (`spec.md` §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSpec {
    /// Resolved to an absolute point in time: seconds since the epoch.
    Absolute(i64),
    /// Relative to "now" at walk time: signed seconds to subtract.
    Relative(i64),
}

/// Parse the text following an `@` in a timestamp-qualified path.
///
/// Accepts the absolute forms `YYYY`, `YYYY-MM-DD`,
/// `YYYY-MM-DDThh:mm[:ss][AM|PM]`, the relative forms `<N>s`, `<N>m<N>s`,
/// `<N>d`, `<N>n` (months), `<N>y`, and the raw-seconds form `c<number>`.
pub fn parse_time(s: &str) -> Option<TimeSpec> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(rest) = s.strip_prefix('c') {
        return rest.parse::<i64>().ok().map(TimeSpec::Absolute);
    }

    if let Some(spec) = parse_relative(s) {
        return Some(spec);
    }

    parse_absolute(s).map(TimeSpec::Absolute)
}

/// Format a `TimeSpec::Absolute` instant back into one of the absolute ISO
/// forms parsed by [`parse_time`]. Used to check the round-trip property in
/// `spec.md` §8: `parse_time(format(t)) == t`.
pub fn format_absolute(secs: i64) -> AbsoluteTimeWriter {
    AbsoluteTimeWriter(time_to_rtcdate(secs))
}

/// Writes an [`RtcDate`] in `YYYY-MM-DDThh:mm:ss` form via `core::fmt`.
pub struct AbsoluteTimeWriter(RtcDate);

impl core::fmt::Display for AbsoluteTimeWriter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let d = &self.0;
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            d.year, d.month, d.day, d.hour, d.minute, d.second
        )
    }
}

fn parse_absolute(s: &str) -> Option<i64> {
    let bytes = s.as_bytes();
    if bytes.len() == 4 && bytes.iter().all(u8::is_ascii_digit) {
        let year: u16 = s.parse().ok()?;
        return Some(rtcdate_to_time(&RtcDate { year, month: 1, day: 1, ..Default::default() }));
    }

    let (date_part, time_part) = match s.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (s, None),
    };

    let mut date_fields = date_part.splitn(3, '-');
    let year: u16 = date_fields.next()?.parse().ok()?;
    let month: u8 = date_fields.next()?.parse().ok()?;
    let day: u8 = date_fields.next()?.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    let mut date = RtcDate { year, month, day, ..Default::default() };

    if let Some(time_part) = time_part {
        let (time_part, pm) = if let Some(t) = time_part.strip_suffix("PM") {
            (t, Some(true))
        } else if let Some(t) = time_part.strip_suffix("AM") {
            (t, Some(false))
        } else {
            (time_part, None)
        };
        let mut time_fields = time_part.splitn(3, ':');
        let mut hour: u8 = time_fields.next()?.parse().ok()?;
        let minute: u8 = time_fields.next()?.parse().ok()?;
        let second: u8 = match time_fields.next() {
            Some(sec) => sec.parse().ok()?,
            None => 0,
        };
        if hour > 23 || minute > 59 || second > 59 {
            return None;
        }
        match pm {
            Some(true) if hour < 12 => hour += 12,
            Some(false) if hour == 12 => hour = 0,
            _ => {}
        }
        date.hour = hour;
        date.minute = minute;
        date.second = second;
    }

    Some(rtcdate_to_time(&date))
}

/// Parses `<N>s`, `<N>m<N>s`, `<N>d`, `<N>n`, `<N>y` (and combinations of a
/// minute/second pair). Each numeric run must be followed by exactly one
/// unit letter.
fn parse_relative(s: &str) -> Option<TimeSpec> {
    let bytes = s.as_bytes();
    if !bytes[0].is_ascii_digit() {
        return None;
    }

    let mut total_secs: i64 = 0;
    let mut idx = 0;
    let mut matched_any = false;

    while idx < bytes.len() {
        let start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        if idx == start {
            return None;
        }
        let n: i64 = s[start..idx].parse().ok()?;
        if idx >= bytes.len() {
            return None;
        }
        let unit = bytes[idx] as char;
        idx += 1;
        let secs = match unit {
            's' => n,
            'm' => n * 60,
            'd' => n * 86_400,
            'n' => n * 30 * 86_400,
            'y' => n * 365 * 86_400,
            _ => return None,
        };
        total_secs += secs;
        matched_any = true;
    }

    if matched_any {
        Some(TimeSpec::Relative(-total_secs))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtc_roundtrip_epoch() {
        let date = RtcDate { second: 0, minute: 0, hour: 0, day: 1, month: 1, year: 2000 };
        assert_eq!(rtcdate_to_time(&date), 0);
        assert_eq!(time_to_rtcdate(0), date);
    }

    #[test]
    fn rtc_roundtrip_arbitrary() {
        let date = RtcDate { second: 42, minute: 17, hour: 9, day: 29, month: 2, year: 2024 };
        let secs = rtcdate_to_time(&date);
        assert_eq!(time_to_rtcdate(secs), date);
    }

    #[test]
    fn rtc_roundtrip_many_days() {
        for days in [0i64, 1, 30, 365, 366, 1000, 36525] {
            let secs = days * 86_400 + 12345;
            let date = time_to_rtcdate(secs);
            assert_eq!(rtcdate_to_time(&date), secs);
        }
    }

    #[test]
    fn parse_year_only() {
        assert_eq!(parse_time("2024"), Some(TimeSpec::Absolute(rtcdate_to_time(&RtcDate {
            year: 2024, month: 1, day: 1, ..Default::default()
        }))));
    }

    #[test]
    fn parse_date() {
        let t = parse_time("2024-03-05").unwrap();
        assert_eq!(t, TimeSpec::Absolute(rtcdate_to_time(&RtcDate {
            year: 2024, month: 3, day: 5, ..Default::default()
        })));
    }

    #[test]
    fn parse_datetime_with_pm() {
        let t = parse_time("2024-03-05T01:30:00PM").unwrap();
        assert_eq!(t, TimeSpec::Absolute(rtcdate_to_time(&RtcDate {
            year: 2024, month: 3, day: 5, hour: 13, minute: 30, second: 0,
        })));
    }

    #[test]
    fn parse_relative_forms() {
        assert_eq!(parse_time("5s"), Some(TimeSpec::Relative(-5)));
        assert_eq!(parse_time("2m5s"), Some(TimeSpec::Relative(-125)));
        assert_eq!(parse_time("1d"), Some(TimeSpec::Relative(-86_400)));
        assert_eq!(parse_time("2n"), Some(TimeSpec::Relative(-60 * 86_400)));
        assert_eq!(parse_time("1y"), Some(TimeSpec::Relative(-365 * 86_400)));
    }

    #[test]
    fn parse_raw_seconds() {
        assert_eq!(parse_time("c1500"), Some(TimeSpec::Absolute(1500)));
    }

    #[test]
    fn format_parse_roundtrip() {
        for secs in [0i64, 1_000, 86_399, 1_234_567] {
            let text = format_absolute(secs);
            let mut buf = heapless_string();
            use core::fmt::Write;
            write!(buf, "{}", text).unwrap();
            assert_eq!(parse_time(buf.as_str()), Some(TimeSpec::Absolute(secs)));
        }
    }

    // A tiny fixed-capacity string writer so this test module stays
    // independent of `alloc`.
    fn heapless_string() -> FixedString {
        FixedString { buf: [0; 32], len: 0 }
    }

    struct FixedString {
        buf: [u8; 32],
        len: usize,
    }

    impl FixedString {
        fn as_str(&self) -> &str {
            core::str::from_utf8(&self.buf[..self.len]).unwrap()
        }
    }

    impl core::fmt::Write for FixedString {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            let bytes = s.as_bytes();
            self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
            self.len += bytes.len();
            Ok(())
        }
    }
}
