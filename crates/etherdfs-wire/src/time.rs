// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Pack and unpack DOS (FAT-style) date+time dwords.
// Author: Lukas Bower

//! DOS-packed timestamps.
//!
//! The wire carries modification times as one little-endian dword:
//!
//! ```text
//! bits 31..25  year - 1980
//! bits 24..21  month (1..12)
//! bits 20..16  day (1..31)
//! bits 15..11  hour (0..23)
//! bits 10..5   minute (0..59)
//! bits 4..0    second / 2 (0..29)
//! ```
//!
//! Conversion from Unix time goes through the local timezone, matching the
//! DOS client's expectation of wall-clock timestamps.

use chrono::{Datelike, Local, TimeZone, Timelike};

/// Pack calendar components into a DOS date+time dword.
///
/// Years outside 1980..=2107 are clamped to the representable range; the
/// seconds field loses its low bit.
#[must_use]
pub fn pack_dos_datetime(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> u32 {
    let year = (year - 1980).clamp(0, 127) as u32;
    (year << 25) | (month << 21) | (day << 16) | (hour << 11) | (min << 5) | (sec / 2)
}

/// Unpack a DOS date+time dword into `(year, month, day, hour, min, sec)`.
#[must_use]
pub fn unpack_dos_datetime(dos: u32) -> (i32, u32, u32, u32, u32, u32) {
    (
        (dos >> 25) as i32 + 1980,
        (dos >> 21) & 0x0f,
        (dos >> 16) & 0x1f,
        (dos >> 11) & 0x1f,
        (dos >> 5) & 0x3f,
        (dos & 0x1f) * 2,
    )
}

/// Convert a Unix timestamp to a DOS date+time dword via the local timezone.
///
/// Returns 0 when the timestamp does not map to a local wall-clock instant.
#[must_use]
pub fn dos_time_from_unix(secs: i64) -> u32 {
    match Local.timestamp_opt(secs, 0).single() {
        Some(t) => pack_dos_datetime(
            t.year(),
            t.month(),
            t.day(),
            t.hour(),
            t.minute(),
            t.second(),
        ),
        None => 0,
    }
}
