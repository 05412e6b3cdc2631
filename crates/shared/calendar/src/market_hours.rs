//! Weekly-session exchange calendar
//!
//! Sessions are interpreted in the exchange's local time zone, so DST moves with
//! the exchange. Holidays remove every session that opens on that local date;
//! early closes cut sessions short on a given date. When extended hours are
//! requested, extended sessions are merged with the regular ones, so a pre-market
//! that runs straight into the regular open is a single open interval.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use conduit_ports::ExchangeCalendar;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

use crate::session::SessionRule;

/// How far ahead `next_market_open` searches before giving up
const MAX_SEARCH_DAYS: u32 = 366;

/// Trading hours for one exchange
#[derive(Debug, Clone)]
pub struct MarketHours {
    name: String,
    tz: Tz,
    regular: Vec<SessionRule>,
    extended: Vec<SessionRule>,
    holidays: BTreeSet<NaiveDate>,
    early_closes: BTreeMap<NaiveDate, NaiveTime>,
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

impl MarketHours {
    /// Create an empty calendar (never open) in `tz`
    pub fn new(name: impl Into<String>, tz: Tz) -> Self {
        Self {
            name: name.into(),
            tz,
            regular: Vec::new(),
            extended: Vec::new(),
            holidays: BTreeSet::new(),
            early_closes: BTreeMap::new(),
        }
    }

    /// US equities: 09:30–16:00 regular, 04:00–20:00 extended, New York time
    pub fn us_equity() -> Self {
        Self::new("US-Equity", chrono_tz::America::New_York)
            .with_regular(SessionRule::weekdays(hm(9, 30), hm(16, 0)))
            .with_extended(SessionRule::weekdays(hm(4, 0), hm(9, 30)))
            .with_extended(SessionRule::weekdays(hm(16, 0), hm(20, 0)))
    }

    /// A market that never closes
    pub fn always_open(tz: Tz) -> Self {
        Self::new("Always-Open", tz).with_regular(SessionRule::every_day(hm(0, 0), hm(0, 0)))
    }

    pub fn with_regular(mut self, rule: SessionRule) -> Self {
        self.regular.push(rule);
        self
    }

    pub fn with_extended(mut self, rule: SessionRule) -> Self {
        self.extended.push(rule);
        self
    }

    pub fn with_holiday(mut self, date: NaiveDate) -> Self {
        self.holidays.insert(date);
        self
    }

    pub fn with_holidays(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(dates);
        self
    }

    /// Close every session opening on `date` no later than `close`
    pub fn with_early_close(mut self, date: NaiveDate, close: NaiveTime) -> Self {
        self.early_closes.insert(date, close);
        self
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    /// Merged `[open, close)` intervals of the sessions that open on `date`, sorted
    pub fn sessions_on(&self, date: NaiveDate, extended_market_hours: bool) -> Vec<(NaiveDateTime, NaiveDateTime)> {
        if self.is_holiday(date) {
            return Vec::new();
        }

        let weekday = date.weekday();
        let extended = self.extended.iter().filter(|_| extended_market_hours);
        let early_close = self.early_closes.get(&date).map(|close| date.and_time(*close));

        let mut intervals: Vec<(NaiveDateTime, NaiveDateTime)> = self
            .regular
            .iter()
            .chain(extended)
            .filter(|rule| rule.applies_on(weekday))
            .map(|rule| rule.interval_on(date))
            .map(|(open, close)| match early_close {
                Some(limit) => (open, close.min(limit)),
                None => (open, close),
            })
            .filter(|(open, close)| close > open)
            .collect();
        intervals.sort();

        let mut merged: Vec<(NaiveDateTime, NaiveDateTime)> = Vec::with_capacity(intervals.len());
        for (open, close) in intervals {
            match merged.last_mut() {
                Some(last) if open <= last.1 => last.1 = last.1.max(close),
                _ => merged.push((open, close)),
            }
        }
        merged
    }

    /// Whether a session is open at `time`
    pub fn is_open(&self, time: NaiveDateTime, extended_market_hours: bool) -> bool {
        let date = time.date();
        [date.pred_opt(), Some(date)]
            .into_iter()
            .flatten()
            .flat_map(|d| self.sessions_on(d, extended_market_hours))
            .any(|(open, close)| open <= time && time < close)
    }
}

impl ExchangeCalendar for MarketHours {
    fn time_zone(&self) -> Tz {
        self.tz
    }

    fn is_open_during_bar(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        extended_market_hours: bool,
    ) -> bool {
        if end <= start {
            return self.is_open(start, extended_market_hours);
        }

        // Overnight sessions opening the day before can reach into the bar
        let mut date = start.date().pred_opt().unwrap_or(start.date());
        let last = end.date();
        while date <= last {
            if self
                .sessions_on(date, extended_market_hours)
                .iter()
                .any(|(open, close)| *open < end && *close > start)
            {
                return true;
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }
        false
    }

    fn next_market_open(&self, time: NaiveDateTime, extended_market_hours: bool) -> NaiveDateTime {
        // Start two days back so a session already running at `time` is recognised
        // as a continuation rather than an open.
        let mut date = time.date();
        for _ in 0..2 {
            date = date.pred_opt().unwrap_or(date);
        }

        let mut open_until: Option<NaiveDateTime> = None;
        for _ in 0..MAX_SEARCH_DAYS + 3 {
            for (open, close) in self.sessions_on(date, extended_market_hours) {
                let continues = open_until.is_some_and(|until| open <= until);
                if !continues && open > time {
                    return open;
                }
                open_until = Some(open_until.map_or(close, |until| until.max(close)));
            }
            match date.succ_opt() {
                Some(next) => date = next,
                None => break,
            }
        }

        debug!("{}: no market open found after {}", self.name, time);
        NaiveDateTime::MAX
    }

    fn name(&self) -> &str {
        &self.name
    }
}
