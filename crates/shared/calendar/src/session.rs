use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};

/// One weekly session slice in the exchange's local time
///
/// If `close <= open` the session runs overnight and closes at `close` on the
/// following local day (`00:00`–`00:00` is a full 24 hour session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionRule {
    /// Weekday activation mask (Mon=0 .. Sun=6)
    pub days: [bool; 7],
    pub open: NaiveTime,
    /// End-exclusive close
    pub close: NaiveTime,
}

impl SessionRule {
    pub fn new(days: [bool; 7], open: NaiveTime, close: NaiveTime) -> Self {
        Self { days, open, close }
    }

    /// Monday through Friday
    pub fn weekdays(open: NaiveTime, close: NaiveTime) -> Self {
        Self::new([true, true, true, true, true, false, false], open, close)
    }

    /// All seven days
    pub fn every_day(open: NaiveTime, close: NaiveTime) -> Self {
        Self::new([true; 7], open, close)
    }

    pub fn applies_on(&self, weekday: Weekday) -> bool {
        self.days[weekday.num_days_from_monday() as usize]
    }

    pub fn is_overnight(&self) -> bool {
        self.close <= self.open
    }

    /// The `[open, close)` interval of the session that opens on `date`
    pub fn interval_on(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let open = date.and_time(self.open);
        let close_date = if self.is_overnight() {
            date.succ_opt().unwrap_or(date)
        } else {
            date
        };
        (open, close_date.and_time(self.close))
    }
}
