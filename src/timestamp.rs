//! High-precision timestamp handling.
//!
//! This module provides the [`Timestamp`] type for file times stored in tar
//! archives. The fixed-width header fields only hold whole seconds, while PAX
//! extended headers carry decimal strings with a fractional part
//! (`1700000000.123456789`). [`Timestamp`] keeps both forms lossless.
//!
//! # Representation
//!
//! A timestamp is a count of seconds since the Unix epoch plus a nanosecond
//! fraction in `0..1_000_000_000`. The seconds are floored, so `-1.5` is
//! stored as `secs = -2, nanos = 500_000_000`.
//!
//! # Example
//!
//! ```rust
//! use tarstream::Timestamp;
//!
//! let ts = Timestamp::parse_pax("1700000000.25").unwrap();
//! assert_eq!(ts.as_unix_secs(), 1_700_000_000);
//! assert_eq!(ts.subsec_nanos(), 250_000_000);
//! assert_eq!(ts.to_pax_string(), "1700000000.25");
//! ```

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Number of nanoseconds per second.
const NANOS_PER_SECOND: u32 = 1_000_000_000;

/// Number of fractional digits PAX timestamps are parsed to.
const MAX_FRACTION_DIGITS: usize = 9;

/// A file timestamp with nanosecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    /// Whole seconds since the Unix epoch (floored).
    secs: i64,
    /// Sub-second part, always below one second.
    nanos: u32,
}

impl Timestamp {
    /// Creates a timestamp from whole Unix seconds.
    #[inline]
    pub const fn from_unix_secs(secs: i64) -> Self {
        Self { secs, nanos: 0 }
    }

    /// Creates a timestamp from Unix seconds and a nanosecond fraction.
    ///
    /// Returns `None` if `nanos` is a full second or more.
    pub const fn from_unix_secs_nanos(secs: i64, nanos: u32) -> Option<Self> {
        if nanos >= NANOS_PER_SECOND {
            return None;
        }
        Some(Self { secs, nanos })
    }

    /// Creates a timestamp from a `SystemTime`.
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(duration) => Self {
                secs: duration.as_secs() as i64,
                nanos: duration.subsec_nanos(),
            },
            Err(e) => {
                let duration = e.duration();
                let secs = -(duration.as_secs() as i64);
                match duration.subsec_nanos() {
                    0 => Self { secs, nanos: 0 },
                    n => Self {
                        secs: secs - 1,
                        nanos: NANOS_PER_SECOND - n,
                    },
                }
            }
        }
    }

    /// Returns the current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Returns the whole Unix seconds, floored.
    #[inline]
    pub const fn as_unix_secs(&self) -> i64 {
        self.secs
    }

    /// Returns the sub-second portion in nanoseconds.
    #[inline]
    pub const fn subsec_nanos(&self) -> u32 {
        self.nanos
    }

    /// Returns true if the timestamp has no sub-second component.
    #[inline]
    pub const fn is_whole_second(&self) -> bool {
        self.nanos == 0
    }

    /// Drops the sub-second component.
    #[inline]
    pub const fn truncated(&self) -> Self {
        Self::from_unix_secs(self.secs)
    }

    /// Converts to a `SystemTime`.
    pub fn as_system_time(&self) -> SystemTime {
        if self.secs >= 0 {
            UNIX_EPOCH + Duration::new(self.secs as u64, self.nanos)
        } else {
            UNIX_EPOCH - Duration::from_secs(self.secs.unsigned_abs()) + Duration::from_nanos(u64::from(self.nanos))
        }
    }

    /// Converts to a [`filetime::FileTime`] for `utimes`-style calls.
    pub fn to_file_time(&self) -> filetime::FileTime {
        filetime::FileTime::from_unix_time(self.secs, self.nanos)
    }

    /// Parses a PAX decimal time value such as `"-1.5"` or `"1700000000"`.
    ///
    /// Digits beyond nanosecond precision are truncated.
    pub fn parse_pax(value: &str) -> Option<Self> {
        let value = value.trim();
        let (negative, digits) = match value.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, value.strip_prefix('+').unwrap_or(value)),
        };
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        let mut nanos: u32 = 0;
        for (i, b) in frac_part.bytes().take(MAX_FRACTION_DIGITS).enumerate() {
            nanos += u32::from(b - b'0') * 10u32.pow((MAX_FRACTION_DIGITS - 1 - i) as u32);
        }
        if !negative {
            return Some(Self { secs: whole, nanos });
        }
        if nanos == 0 {
            Some(Self {
                secs: whole.checked_neg()?,
                nanos: 0,
            })
        } else {
            Some(Self {
                secs: whole.checked_neg()?.checked_sub(1)?,
                nanos: NANOS_PER_SECOND - nanos,
            })
        }
    }

    /// Formats as a PAX decimal time value with trailing zeros trimmed.
    pub fn to_pax_string(&self) -> String {
        if self.nanos == 0 {
            return self.secs.to_string();
        }
        let (sign, whole, frac) = if self.secs >= 0 {
            ("", self.secs.unsigned_abs(), self.nanos)
        } else {
            ("-", (self.secs + 1).unsigned_abs(), NANOS_PER_SECOND - self.nanos)
        };
        let frac = format!("{frac:09}");
        format!("{sign}{whole}.{}", frac.trim_end_matches('0'))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_pax_string())
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        Self::from_system_time(time)
    }
}

impl From<Timestamp> for SystemTime {
    fn from(ts: Timestamp) -> SystemTime {
        ts.as_system_time()
    }
}

impl From<filetime::FileTime> for Timestamp {
    fn from(ft: filetime::FileTime) -> Self {
        Self {
            secs: ft.unix_seconds(),
            nanos: ft.nanoseconds(),
        }
    }
}
