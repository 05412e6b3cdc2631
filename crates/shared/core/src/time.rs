//! Calendar arithmetic on exchange-local timestamps
//!
//! Stream elements carry naive local times; these helpers convert them between
//! zones and align them to bar boundaries. Conversions are lenient: a local time
//! that occurs twice (DST fall-back) resolves to the later instant, and a local
//! time skipped by a DST gap is shifted forward by the length of the gap.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

const NANOS_PER_SECOND: i128 = 1_000_000_000;

fn total_nanos(value: Duration) -> i128 {
    value.num_seconds() as i128 * NANOS_PER_SECOND + value.subsec_nanos() as i128
}

/// Round `value` down to a multiple of `interval` (measured from the Unix epoch)
///
/// A zero or negative interval leaves the value unchanged.
pub fn round_down(value: NaiveDateTime, interval: Duration) -> NaiveDateTime {
    let interval_nanos = total_nanos(interval);
    if interval_nanos <= 0 {
        return value;
    }

    let since_epoch = value.and_utc().timestamp() as i128 * NANOS_PER_SECOND
        + value.and_utc().timestamp_subsec_nanos() as i128;
    let remainder = since_epoch.rem_euclid(interval_nanos);
    if remainder == 0 {
        return value;
    }

    let seconds = (remainder / NANOS_PER_SECOND) as i64;
    let nanos = (remainder % NANOS_PER_SECOND) as i64;
    value - Duration::seconds(seconds) - Duration::nanoseconds(nanos)
}

/// Resolve a local wall-clock time in `tz` to a UTC instant
pub fn local_to_utc(local: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    if let Some(resolved) = tz.from_local_datetime(&local).latest() {
        return resolved.with_timezone(&Utc);
    }

    // Inside a DST gap: interpret with the offset in force before the gap.
    for hours_back in 1..=24 {
        let shift = Duration::hours(hours_back);
        let resolved = local
            .checked_sub_signed(shift)
            .and_then(|earlier| tz.from_local_datetime(&earlier).latest())
            .and_then(|before| before.with_timezone(&Utc).checked_add_signed(shift));
        if let Some(utc) = resolved {
            return utc;
        }
    }
    local.and_utc()
}

/// Local wall-clock time in `tz` for a UTC instant
pub fn utc_to_local(utc: DateTime<Utc>, tz: Tz) -> NaiveDateTime {
    utc.with_timezone(&tz).naive_local()
}

/// Re-express a local time from one zone in another
pub fn convert_time_zone(value: NaiveDateTime, from: Tz, to: Tz) -> NaiveDateTime {
    if from == to {
        return value;
    }
    utc_to_local(local_to_utc(value, from), to)
}

/// Round `value` (local to `source_tz`) down to `interval` as seen from `rounding_tz`
///
/// Daily data whose midnight differs from the exchange's midnight must be rounded
/// in the data's own zone, otherwise bars silently collapse onto the wrong day.
pub fn round_down_in_time_zone(
    value: NaiveDateTime,
    interval: Duration,
    source_tz: Tz,
    rounding_tz: Tz,
) -> NaiveDateTime {
    let in_rounding_zone = convert_time_zone(value, source_tz, rounding_tz);
    let rounded = round_down(in_rounding_zone, interval);
    convert_time_zone(rounded, rounding_tz, source_tz)
}
