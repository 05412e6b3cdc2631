use chrono::{DateTime, Duration, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use conduit_core::time::{local_to_utc, utc_to_local};

/// A span of time during which the zone's UTC offset is constant
#[derive(Debug, Clone, Copy)]
struct OffsetSegment {
    /// First UTC instant of the span
    utc_start: DateTime<Utc>,
    /// Local wall-clock time at `utc_start`
    local_start: NaiveDateTime,
    /// Local minus UTC
    offset: Duration,
}

/// Local/UTC converter for one time zone over a bounded window
///
/// The UTC offsets in force between `start_utc` and `end_utc` are computed once at
/// construction, so conversions inside the window are a binary search with no tz
/// database lookups. Conversions outside the window fall back to the full database.
/// Local times that occur twice resolve to the later instant; local times inside a
/// DST gap are shifted forward by the gap.
#[derive(Debug, Clone)]
pub struct TimeZoneOffsetProvider {
    time_zone: Tz,
    start_utc: DateTime<Utc>,
    end_utc: DateTime<Utc>,
    segments: Vec<OffsetSegment>,
}

fn offset_at(tz: Tz, utc: DateTime<Utc>) -> Duration {
    let seconds = tz
        .offset_from_utc_datetime(&utc.naive_utc())
        .fix()
        .local_minus_utc();
    Duration::seconds(seconds as i64)
}

fn from_timestamp(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(seconds, 0)
}

impl TimeZoneOffsetProvider {
    /// Precompute the offsets of `time_zone` for `[start_utc, end_utc]`
    pub fn new(time_zone: Tz, start_utc: DateTime<Utc>, end_utc: DateTime<Utc>) -> Self {
        let (start_utc, end_utc) = if end_utc < start_utc {
            (end_utc, start_utc)
        } else {
            (start_utc, end_utc)
        };

        let mut segments = Vec::new();
        let mut offset = offset_at(time_zone, start_utc);
        segments.push(OffsetSegment {
            utc_start: start_utc,
            local_start: start_utc.naive_utc() + offset,
            offset,
        });

        // Transitions happen at most once a day in every real zone, so a daily scan
        // followed by a bisection to the second finds all of them.
        let mut cursor = start_utc.timestamp();
        let end = end_utc.timestamp();
        while cursor < end {
            let step = (cursor + 86_400).min(end);
            let Some(step_utc) = from_timestamp(step) else {
                break;
            };
            let step_offset = offset_at(time_zone, step_utc);
            if step_offset != offset {
                let transition = Self::find_transition(time_zone, cursor, step, offset);
                segments.push(OffsetSegment {
                    utc_start: transition,
                    local_start: transition.naive_utc() + step_offset,
                    offset: step_offset,
                });
                offset = step_offset;
            }
            cursor = step;
        }

        Self {
            time_zone,
            start_utc,
            end_utc,
            segments,
        }
    }

    /// First whole second in `(low, high]` at which the offset differs from `before`
    fn find_transition(tz: Tz, mut low: i64, mut high: i64, before: Duration) -> DateTime<Utc> {
        while high - low > 1 {
            let mid = low + (high - low) / 2;
            match from_timestamp(mid) {
                Some(mid_utc) if offset_at(tz, mid_utc) == before => low = mid,
                _ => high = mid,
            }
        }
        from_timestamp(high).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn time_zone(&self) -> Tz {
        self.time_zone
    }

    /// Window the precomputed offsets cover
    pub fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.start_utc, self.end_utc)
    }

    /// Number of UTC offset changes inside the window
    pub fn transition_count(&self) -> usize {
        self.segments.len().saturating_sub(1)
    }

    fn in_window(&self, utc: DateTime<Utc>) -> bool {
        utc >= self.start_utc && utc <= self.end_utc
    }

    /// Local wall-clock time for a UTC instant
    pub fn from_utc(&self, utc: DateTime<Utc>) -> NaiveDateTime {
        if !self.in_window(utc) {
            return utc_to_local(utc, self.time_zone);
        }
        let index = self
            .segments
            .partition_point(|segment| segment.utc_start <= utc)
            .saturating_sub(1);
        utc.naive_utc()
            .checked_add_signed(self.segments[index].offset)
            .unwrap_or_else(|| utc_to_local(utc, self.time_zone))
    }

    /// UTC instant for a local wall-clock time
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let count = self
            .segments
            .partition_point(|segment| segment.local_start <= local);
        if count > 0 {
            let segment = &self.segments[count - 1];
            if let Some(utc) = local.checked_sub_signed(segment.offset) {
                let utc = utc.and_utc();
                if self.in_window(utc) {
                    return utc;
                }
            }
        }
        local_to_utc(local, self.time_zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use chrono_tz::America::New_York;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .unwrap()
    }

    fn year_2024() -> TimeZoneOffsetProvider {
        TimeZoneOffsetProvider::new(New_York, utc(2024, 1, 1, 0, 0), utc(2025, 1, 1, 0, 0))
    }

    #[test]
    fn test_finds_both_dst_transitions() {
        let provider = year_2024();
        assert_eq!(provider.transition_count(), 2);
        // Spring forward at 07:00 UTC, fall back at 06:00 UTC
        assert_eq!(provider.segments[1].utc_start, utc(2024, 3, 10, 7, 0));
        assert_eq!(provider.segments[2].utc_start, utc(2024, 11, 3, 6, 0));
    }

    #[test]
    fn test_round_trip_either_side_of_transitions() {
        let provider = year_2024();
        for instant in [
            utc(2024, 1, 15, 14, 30),
            utc(2024, 3, 10, 6, 59),
            utc(2024, 3, 10, 7, 0),
            utc(2024, 7, 4, 13, 30),
            utc(2024, 11, 3, 6, 0),
            utc(2024, 12, 24, 21, 0),
        ] {
            let local_time = provider.from_utc(instant);
            assert_eq!(local_time, instant.with_timezone(&New_York).naive_local());
            assert_eq!(provider.to_utc(local_time), instant);
        }
    }

    #[test]
    fn test_gap_and_overlap_resolution() {
        let provider = year_2024();
        // Inside the spring gap: shifted forward
        assert_eq!(provider.to_utc(local(2024, 3, 10, 2, 30)), utc(2024, 3, 10, 7, 30));
        // Inside the fall overlap: later instant
        assert_eq!(provider.to_utc(local(2024, 11, 3, 1, 30)), utc(2024, 11, 3, 6, 30));
    }

    #[test]
    fn test_outside_window_falls_back_to_database() {
        let provider = TimeZoneOffsetProvider::new(
            New_York,
            utc(2024, 1, 1, 0, 0),
            utc(2024, 2, 1, 0, 0),
        );
        assert_eq!(provider.transition_count(), 0);

        let summer = utc(2024, 7, 4, 13, 30);
        assert_eq!(provider.from_utc(summer), local(2024, 7, 4, 9, 30));
        assert_eq!(provider.to_utc(local(2024, 7, 4, 9, 30)), summer);
    }

    #[test]
    fn test_utc_zone_is_identity() {
        let provider =
            TimeZoneOffsetProvider::new(chrono_tz::UTC, utc(2024, 1, 1, 0, 0), utc(2025, 1, 1, 0, 0));
        let instant = utc(2024, 6, 1, 12, 0);
        assert_eq!(provider.from_utc(instant), instant.naive_utc());
        assert_eq!(provider.to_utc(instant.naive_utc()), instant);
    }
}
