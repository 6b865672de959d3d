//! Display helpers for header values: digit grouping and reset timestamps.

use std::fmt;
use time::{
    OffsetDateTime, PrimitiveDateTime, UtcOffset,
    error::IndeterminateOffset,
    format_description::BorrowedFormatItem,
    macros::format_description,
};

pub const UNKNOWN: &str = "Unknown";

const RESET_INPUT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");
const RESET_DISPLAY: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour repr:12]:[minute]:[second] [period]");

/// Local timezone, captured once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalZone {
    offset: UtcOffset,
}

impl LocalZone {
    /// Must run before any other thread is spawned, otherwise `time` refuses
    /// to read the local offset on unix and we fall back to UTC.
    /// Install the log subscriber first so the fallback warning is visible.
    pub fn detect() -> Self {
        Self::from_local(UtcOffset::current_local_offset())
    }

    fn from_local(offset: Result<UtcOffset, IndeterminateOffset>) -> Self {
        match offset {
            Ok(offset) => Self::fixed(offset),
            Err(e) => {
                tracing::warn!("cannot determine local UTC offset ({e}), using UTC");
                Self::utc()
            }
        }
    }

    pub fn utc() -> Self {
        Self { offset: UtcOffset::UTC }
    }

    pub fn fixed(offset: UtcOffset) -> Self {
        Self { offset }
    }
}

impl fmt::Display for LocalZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset.is_utc() {
            return f.write_str("UTC");
        }
        let sign = if self.offset.is_negative() { '-' } else { '+' };
        write!(
            f,
            "UTC{sign}{:02}:{:02}",
            self.offset.whole_hours().unsigned_abs(),
            self.offset.minutes_past_hour().unsigned_abs()
        )
    }
}

/// `"1234567"` → `"1,234,567"`. Anything that isn't an integer comes back as is.
pub fn format_number(raw: &str) -> String {
    match raw.trim().parse::<i128>() {
        Ok(n) => group_thousands(n),
        Err(_) => raw.to_string(),
    }
}

fn group_thousands(n: i128) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Renders a `YYYY-MM-DDTHH:MM:SSZ` reset stamp in `zone` with a countdown
/// from `now`, e.g. `2024-01-01 01:00:00 AM UTC+01:00 (Resets in 1h 0m)`.
/// Returns `"Unknown"` for anything that doesn't parse.
pub fn format_reset_time(raw: &str, zone: LocalZone, now: OffsetDateTime) -> String {
    let Ok(parsed) = PrimitiveDateTime::parse(raw, RESET_INPUT) else {
        return UNKNOWN.to_string();
    };
    let reset = parsed.assume_utc();
    let Some(local) = reset.checked_to_offset(zone.offset) else {
        return UNKNOWN.to_string();
    };
    let Ok(stamp) = local.format(RESET_DISPLAY) else {
        return UNKNOWN.to_string();
    };

    let remaining = reset - now;
    let countdown = if remaining.is_negative() {
        "Reset time passed".to_string()
    } else {
        format!(
            "Resets in {}h {}m",
            remaining.whole_hours(),
            remaining.whole_minutes() % 60
        )
    };

    format!("{stamp} {zone} ({countdown})")
}
