use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nominal duration of one unit of market data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Tick,
    Second,
    Minute,
    Hour,
    Daily,
}

impl Resolution {
    /// Fixed duration of one bar at this resolution (`Tick` is zero-length)
    pub fn to_duration(self) -> Duration {
        match self {
            Resolution::Tick => Duration::zero(),
            Resolution::Second => Duration::seconds(1),
            Resolution::Minute => Duration::minutes(1),
            Resolution::Hour => Duration::hours(1),
            Resolution::Daily => Duration::days(1),
        }
    }

    /// All resolutions, finest first
    pub fn all() -> [Resolution; 5] {
        [
            Resolution::Tick,
            Resolution::Second,
            Resolution::Minute,
            Resolution::Hour,
            Resolution::Daily,
        ]
    }
}

impl From<Resolution> for Duration {
    fn from(resolution: Resolution) -> Self {
        resolution.to_duration()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resolution::Tick => "tick",
            Resolution::Second => "second",
            Resolution::Minute => "minute",
            Resolution::Hour => "hour",
            Resolution::Daily => "daily",
        };
        f.write_str(name)
    }
}
