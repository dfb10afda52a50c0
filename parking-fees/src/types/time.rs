use std::{fmt::Display, str::FromStr};

use chrono::{NaiveTime, Timelike, Weekday};
use serde::{Serialize, Serializer};

use crate::InvalidRate;

pub(crate) const MINS_IN_HOUR: u32 = 60;
pub(crate) const MINS_IN_DAY: u32 = 24 * MINS_IN_HOUR;

/// A local clock time with minute precision. `24:00` is allowed as the end of a range.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
pub struct ClockTime(u32);

impl ClockTime {
    /// Midnight at the start of the day.
    pub const MIDNIGHT: Self = Self(0);

    /// Construct from minutes since midnight, up to and including `24:00`.
    #[must_use]
    pub fn from_minutes(minutes: u32) -> Option<Self> {
        (minutes <= MINS_IN_DAY).then_some(Self(minutes))
    }

    /// Minutes since midnight.
    #[must_use]
    pub fn minutes(self) -> u32 {
        self.0
    }

    /// Minutes since midnight where `24:00` folds back onto `00:00`.
    pub(crate) fn minute_of_day(self) -> u32 {
        self.0 % MINS_IN_DAY
    }
}

impl From<NaiveTime> for ClockTime {
    fn from(time: NaiveTime) -> Self {
        Self(time.hour() * MINS_IN_HOUR + time.minute())
    }
}

impl FromStr for ClockTime {
    type Err = InvalidRate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidRate::TimeRange(s.to_owned());

        let (hours, minutes) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hours: u32 = hours.parse().map_err(|_| invalid())?;
        let minutes: u32 = minutes.parse().map_err(|_| invalid())?;

        if minutes >= MINS_IN_HOUR || hours > 24 || (hours == 24 && minutes > 0) {
            return Err(invalid());
        }

        Ok(Self(hours * MINS_IN_HOUR + minutes))
    }
}

impl Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hours = self.0 / MINS_IN_HOUR;
        let minutes = self.0 % MINS_IN_HOUR;
        write!(f, "{hours:0>2}:{minutes:0>2}")
    }
}

/// A window of clock time, for example `22:00~06:00`.
///
/// The start is inclusive and the end exclusive. A range whose end lies before its start wraps
/// past midnight. A range with equal start and end covers the whole day.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct TimeRange {
    start: ClockTime,
    end: ClockTime,
}

impl TimeRange {
    #[must_use]
    pub fn new(start: ClockTime, end: ClockTime) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub fn start(&self) -> ClockTime {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> ClockTime {
        self.end
    }

    /// Whether this range continues past midnight into the next day.
    #[must_use]
    pub fn is_wrapping(&self) -> bool {
        self.end < self.start
    }

    /// Whether the minute of the day `minute` falls within this range.
    #[must_use]
    pub fn contains(&self, minute: u32) -> bool {
        let start = self.start.minute_of_day();
        let end = self.end.minute_of_day();

        if start == end {
            true
        } else if end < start {
            minute >= start || minute < end
        } else {
            minute >= start && minute < end
        }
    }

    /// The minutes of the day where this range starts or stops applying.
    pub(crate) fn boundaries(&self) -> [u32; 2] {
        [self.start.minute_of_day(), self.end.minute_of_day()]
    }
}

impl FromStr for TimeRange {
    type Err = InvalidRate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidRate::TimeRange(s.to_owned());

        let (start, end) = ['~', '〜', '-']
            .into_iter()
            .find_map(|sep| s.split_once(sep))
            .ok_or_else(invalid)?;

        let start: ClockTime = start.parse().map_err(|_| invalid())?;
        let end: ClockTime = end.parse().map_err(|_| invalid())?;

        if start == ClockTime(MINS_IN_DAY) {
            return Err(invalid());
        }

        Ok(Self { start, end })
    }
}

impl Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}~{}", self.start, self.end)
    }
}

impl Serialize for TimeRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Whether a calendar day is billed as a weekday or as a weekend/holiday.
#[derive(Debug, Copy, PartialEq, Eq, Clone, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayClass {
    Weekday,
    WeekendHoliday,
}

impl Display for DayClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Weekday => f.write_str("weekday"),
            Self::WeekendHoliday => f.write_str("weekend/holiday"),
        }
    }
}

/// Days of the week.
#[derive(Debug, Copy, PartialEq, Eq, Clone, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayOfWeek {
    /// Monday
    Monday,
    /// Tuesday
    Tuesday,
    /// Wednesday
    Wednesday,
    /// Thursday
    Thursday,
    /// Friday
    Friday,
    /// Saturday
    Saturday,
    /// Sunday
    Sunday,
}

impl DayOfWeek {
    /// Every day of the week, starting on Monday.
    pub const ALL: [Self; 7] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
        Self::Sunday,
    ];

    #[must_use]
    pub fn is_weekend(self) -> bool {
        matches!(self, Self::Saturday | Self::Sunday)
    }
}

impl From<DayOfWeek> for Weekday {
    fn from(day: DayOfWeek) -> Self {
        match day {
            DayOfWeek::Monday => Self::Mon,
            DayOfWeek::Tuesday => Self::Tue,
            DayOfWeek::Wednesday => Self::Wed,
            DayOfWeek::Thursday => Self::Thu,
            DayOfWeek::Friday => Self::Fri,
            DayOfWeek::Saturday => Self::Sat,
            DayOfWeek::Sunday => Self::Sun,
        }
    }
}

impl FromStr for DayOfWeek {
    type Err = InvalidRate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let day = match s.trim().to_ascii_lowercase().as_str() {
            "mon" | "monday" | "月" => Self::Monday,
            "tue" | "tuesday" | "火" => Self::Tuesday,
            "wed" | "wednesday" | "水" => Self::Wednesday,
            "thu" | "thursday" | "木" => Self::Thursday,
            "fri" | "friday" | "金" => Self::Friday,
            "sat" | "saturday" | "土" => Self::Saturday,
            "sun" | "sunday" | "日" => Self::Sunday,
            _ => return Err(InvalidRate::DayType(s.to_owned())),
        };

        Ok(day)
    }
}

/// The days on which a rate applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayType {
    Weekday,
    WeekendHoliday,
    /// Every day; equivalent to leaving the day type out.
    Daily,
    /// An explicit list of days of the week.
    Days(Vec<DayOfWeek>),
}

impl DayType {
    /// Whether this day type narrows the days a rate applies on.
    #[must_use]
    pub fn is_scoped(&self) -> bool {
        !matches!(self, Self::Daily)
    }

    /// Whether a day of class `class` falling on `weekday` is covered.
    #[must_use]
    pub fn matches(&self, class: DayClass, weekday: Weekday) -> bool {
        match self {
            Self::Weekday => class == DayClass::Weekday,
            Self::WeekendHoliday => class == DayClass::WeekendHoliday,
            Self::Daily => true,
            Self::Days(days) => days.iter().any(|&day| Weekday::from(day) == weekday),
        }
    }

    /// Whether every day of class `class` is covered, used for stay level matching.
    pub(crate) fn covers_class(&self, class: DayClass) -> bool {
        match self {
            Self::Weekday => class == DayClass::Weekday,
            Self::WeekendHoliday => class == DayClass::WeekendHoliday,
            Self::Daily => true,
            Self::Days(_) => false,
        }
    }
}

impl FromStr for DayType {
    type Err = InvalidRate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let day_type = match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "weekday" | "weekdays" | "平日" => Self::Weekday,
            "weekend" | "weekends" | "holiday" | "holidays" | "weekend_holiday"
            | "weekendholiday" | "土日祝" => Self::WeekendHoliday,
            "daily" | "all" | "everyday" | "every_day" | "毎日" => Self::Daily,
            list => Self::Days(
                list.split(',')
                    .map(str::parse)
                    .collect::<Result<Vec<DayOfWeek>, _>>()
                    .map_err(|_| InvalidRate::DayType(s.to_owned()))?,
            ),
        };

        Ok(day_type)
    }
}

impl Display for DayType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Weekday => f.write_str("weekdays"),
            Self::WeekendHoliday => f.write_str("weekends and holidays"),
            Self::Daily => f.write_str("every day"),
            Self::Days(days) => {
                let names: Vec<_> = days.iter().map(|&day| Weekday::from(day).to_string()).collect();
                f.write_str(&names.join(", "))
            }
        }
    }
}
