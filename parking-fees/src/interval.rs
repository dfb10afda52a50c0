use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::debug;

use crate::{
    tariff::{Cap, TariffTable},
    types::time::{DayClass, MINS_IN_DAY, MINS_IN_HOUR},
    Error, Result,
};

/// A parking stay in local clock time. The end is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParkingInterval {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl ParkingInterval {
    /// Construct a stay, failing when `end` lies before `start`.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidInterval);
        }

        Ok(Self { start, end })
    }

    /// Construct a stay from two instants, read on the clock of `local_timezone`.
    pub fn from_utc(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        local_timezone: Tz,
    ) -> Result<Self> {
        Self::new(
            start.with_timezone(&local_timezone).naive_local(),
            end.with_timezone(&local_timezone).naive_local(),
        )
    }

    #[must_use]
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// The start of the stay, truncated to the minute.
    pub(crate) fn billed_start(&self) -> NaiveDateTime {
        self.start
            .with_second(0)
            .and_then(|start| start.with_nanosecond(0))
            .unwrap_or(self.start)
    }

    /// The number of started minutes between the billed start and the end of the stay.
    pub fn billed_minutes(&self) -> Result<u32> {
        let duration = self.end.signed_duration_since(self.billed_start());
        let mut minutes = duration.num_minutes();

        if duration > Duration::minutes(minutes) {
            minutes += 1;
        }

        u32::try_from(minutes).map_err(|_| Error::NumericOverflow)
    }
}

/// Classifies calendar days as weekdays or weekend/holidays.
#[derive(Debug, Clone, Default)]
pub struct Calendar {
    holidays: HashSet<NaiveDate>,
}

impl Calendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn day_class(&self, date: NaiveDate) -> DayClass {
        let is_weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);

        if is_weekend || self.holidays.contains(&date) {
            DayClass::WeekendHoliday
        } else {
            DayClass::Weekday
        }
    }

    pub(crate) fn instant(&self, date_time: NaiveDateTime) -> Instant {
        Instant {
            minute_of_day: date_time.hour() * MINS_IN_HOUR + date_time.minute(),
            weekday: date_time.weekday(),
            day_class: self.day_class(date_time.date()),
        }
    }
}

/// The properties of a moment in the stay that rates are matched against.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Instant {
    pub minute_of_day: u32,
    pub weekday: Weekday,
    pub day_class: DayClass,
}

/// A stretch of a chunk within one calendar day over which the same rates apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TimeSegment {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub minutes: u32,
}

impl TimeSegment {
    /// Cut the segment after `minutes`, which must lie within it.
    pub fn split_at(self, minutes: u32) -> (Self, Self) {
        let middle = self
            .start
            .checked_add_signed(span(minutes))
            .map_or(self.end, |middle| middle.min(self.end));

        let head = Self {
            start: self.start,
            end: middle,
            minutes,
        };
        let tail = Self {
            start: middle,
            end: self.end,
            minutes: self.minutes.saturating_sub(minutes),
        };

        (head, tail)
    }
}

/// The reason a chunk was cut out of the stay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// The whole stay.
    Stay,
    /// A window of a cap, for example a full day under a daily cap.
    Window,
}

/// A part of the stay whose fee is capped as a whole.
#[derive(Debug, Clone)]
pub(crate) struct Chunk {
    pub kind: ChunkKind,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub minutes: u32,
    pub cap: Option<Cap>,
    pub parts: Parts,
}

/// A chunk is either split further into windows of a shorter cap, or into segments.
#[derive(Debug, Clone)]
pub(crate) enum Parts {
    Windows(Vec<Chunk>),
    Segments(Vec<TimeSegment>),
}

/// Splits stays into capped chunks and clock time segments for one tariff table.
pub(crate) struct Decomposer {
    /// Unscoped bounded caps, longest window first.
    windows: Vec<Cap>,
    /// Minutes of the day where segments are cut, ascending, excluding midnight.
    boundaries: Vec<u32>,
}

impl Decomposer {
    pub fn new(tariff: &TariffTable) -> Self {
        Self {
            windows: tariff.cap_windows(),
            boundaries: tariff.boundaries(),
        }
    }

    /// Split a stay of `minutes` starting at `start` into a tree of chunks.
    ///
    /// A stay longer than a cap's window is tiled into consecutive windows of that length, the
    /// last one holding the remainder. Each window is in turn tiled by the next shorter cap.
    pub fn decompose(&self, start: NaiveDateTime, minutes: u32) -> Result<Chunk> {
        debug!(%start, minutes, windows = self.windows.len(), "decomposing stay");
        self.chunk(ChunkKind::Stay, start, minutes, &self.windows)
    }

    fn chunk(
        &self,
        kind: ChunkKind,
        start: NaiveDateTime,
        minutes: u32,
        windows: &[Cap],
    ) -> Result<Chunk> {
        let end = advance(start, minutes)?;
        let cap = self.cap_for(minutes);
        let tiling = windows
            .iter()
            .position(|cap| cap.window.is_some_and(|window| window.get() < minutes));

        let parts = match tiling {
            Some(position) => {
                let window = windows[position].window.map_or(minutes, |window| window.get());
                let shorter = &windows[position + 1..];

                let mut chunks = Vec::new();
                let mut offset = 0;

                while offset < minutes {
                    let length = window.min(minutes - offset);
                    let start = advance(start, offset)?;
                    chunks.push(self.chunk(ChunkKind::Window, start, length, shorter)?);
                    offset += length;
                }

                Parts::Windows(chunks)
            }
            None => Parts::Segments(self.segments(start, end)),
        };

        Ok(Chunk {
            kind,
            start,
            end,
            minutes,
            cap,
            parts,
        })
    }

    /// The cheapest unscoped cap whose window holds a chunk of `minutes`.
    fn cap_for(&self, minutes: u32) -> Option<Cap> {
        self.windows
            .iter()
            .filter(|cap| cap.window.is_some_and(|window| window.get() >= minutes))
            .min_by_key(|cap| (cap.price, cap.rate_index))
            .copied()
    }

    /// Split a stretch of time at every midnight and at every boundary of a time range.
    pub fn segments(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<TimeSegment> {
        let mut segments = Vec::new();
        let mut cursor = start;

        while cursor < end {
            let minute_of_day = cursor.hour() * MINS_IN_HOUR + cursor.minute();
            let next_boundary = self
                .boundaries
                .iter()
                .copied()
                .find(|&boundary| boundary > minute_of_day)
                .unwrap_or(MINS_IN_DAY);

            let segment_end = cursor
                .checked_add_signed(span(next_boundary - minute_of_day))
                .map_or(end, |boundary| boundary.min(end));
            let length = segment_end.signed_duration_since(cursor).num_minutes();

            segments.push(TimeSegment {
                start: cursor,
                end: segment_end,
                minutes: u32::try_from(length).unwrap_or(0),
            });

            cursor = segment_end;
        }

        segments
    }
}

fn span(minutes: u32) -> Duration {
    Duration::minutes(i64::from(minutes))
}

/// `start` moved forward by `minutes`.
pub(crate) fn advance(start: NaiveDateTime, minutes: u32) -> Result<NaiveDateTime> {
    start
        .checked_add_signed(span(minutes))
        .ok_or(Error::NumericOverflow)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

    use super::{Calendar, Chunk, Decomposer, ParkingInterval, Parts};
    use crate::tariff::{Rate, RateKind, TariffTable};
    use crate::types::{money::Money, time::DayClass};
    use crate::Error;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn rate(kind: RateKind, time_range: Option<&str>) -> Rate {
        Rate {
            kind,
            time_range: time_range.map(|r| r.parse().unwrap()),
            day_type: None,
        }
    }

    fn base(time_range: Option<&str>) -> Rate {
        rate(
            RateKind::Base {
                unit_minutes: NonZeroU32::new(30).unwrap(),
                price: Money::from_minor(200),
            },
            time_range,
        )
    }

    fn max(window: u32, price: u64) -> Rate {
        rate(
            RateKind::Max {
                window: NonZeroU32::new(window),
                price: Money::from_minor(price),
            },
            None,
        )
    }

    fn windows(chunk: &Chunk) -> Vec<(u32, Option<u64>)> {
        match &chunk.parts {
            Parts::Windows(chunks) => chunks
                .iter()
                .map(|c| (c.minutes, c.cap.map(|cap| cap.price.minor())))
                .collect(),
            Parts::Segments(_) => Vec::new(),
        }
    }

    #[test]
    fn end_before_start_is_rejected() {
        assert_eq!(
            ParkingInterval::new(at(3, 10, 0), at(3, 9, 0)),
            Err(Error::InvalidInterval)
        );
    }

    #[test]
    fn partial_minutes_are_billed_as_started_minutes() {
        let start = at(3, 10, 0) + chrono::Duration::seconds(30);
        let end = at(3, 10, 30) + chrono::Duration::seconds(10);
        let interval = ParkingInterval::new(start, end).unwrap();

        assert_eq!(interval.billed_start(), at(3, 10, 0));
        assert_eq!(interval.billed_minutes().unwrap(), 31);
    }

    #[test]
    fn utc_instants_are_read_on_the_local_clock() {
        let start = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 3, 1, 0, 0).unwrap();
        let interval = ParkingInterval::from_utc(start, end, chrono_tz::Asia::Tokyo).unwrap();

        assert_eq!(interval.start(), at(3, 9, 0));
        assert_eq!(interval.billed_minutes().unwrap(), 60);
    }

    #[test]
    fn holidays_and_weekends_share_a_class() {
        let calendar = Calendar::new([NaiveDate::from_ymd_opt(2024, 6, 4).unwrap()]);

        assert_eq!(calendar.day_class(at(3, 0, 0).date()), DayClass::Weekday);
        assert_eq!(calendar.day_class(at(4, 0, 0).date()), DayClass::WeekendHoliday);
        assert_eq!(calendar.day_class(at(8, 0, 0).date()), DayClass::WeekendHoliday);
    }

    #[test]
    fn segments_split_at_boundaries_and_midnight() {
        let table = TariffTable::new(vec![base(Some("08:00~22:00")), base(Some("22:00~08:00"))]);
        let decomposer = Decomposer::new(&table);

        let segments = decomposer.segments(at(3, 21, 0), at(4, 9, 0));
        let spans: Vec<_> = segments.iter().map(|s| (s.start, s.minutes)).collect();

        assert_eq!(
            spans,
            vec![
                (at(3, 21, 0), 60),
                (at(3, 22, 0), 120),
                (at(4, 0, 0), 480),
                (at(4, 8, 0), 60),
            ]
        );
        assert_eq!(segments.last().unwrap().end, at(4, 9, 0));
    }

    #[test]
    fn stay_without_caps_is_one_chunk_of_segments() {
        let table = TariffTable::new(vec![base(None)]);
        let chunk = Decomposer::new(&table)
            .decompose(at(3, 10, 0), 3 * 1440)
            .unwrap();

        assert!(chunk.cap.is_none());
        assert!(matches!(&chunk.parts, Parts::Segments(segments) if segments.len() == 4));
    }

    #[test]
    fn daily_cap_tiles_whole_days_plus_remainder() {
        let table = TariffTable::new(vec![base(None), max(1440, 2000)]);
        let chunk = Decomposer::new(&table)
            .decompose(at(3, 10, 0), 2 * 1440 + 30)
            .unwrap();

        assert!(chunk.cap.is_none());
        assert_eq!(
            windows(&chunk),
            vec![(1440, Some(2000)), (1440, Some(2000)), (30, Some(2000))]
        );
    }

    #[test]
    fn short_stay_under_daily_cap_is_capped_whole() {
        let table = TariffTable::new(vec![base(None), max(1440, 2000)]);
        let chunk = Decomposer::new(&table).decompose(at(3, 10, 0), 300).unwrap();

        assert_eq!(chunk.cap.map(|cap| cap.price.minor()), Some(2000));
        assert!(matches!(chunk.parts, Parts::Segments(_)));
    }

    #[test]
    fn rolling_cap_nests_inside_daily_cap() {
        let table = TariffTable::new(vec![base(None), max(1440, 2000), max(600, 900)]);
        let chunk = Decomposer::new(&table)
            .decompose(at(3, 10, 0), 1440 + 700)
            .unwrap();

        assert_eq!(windows(&chunk), vec![(1440, Some(2000)), (700, Some(2000))]);

        let Parts::Windows(days) = &chunk.parts else {
            panic!("expected windows");
        };

        assert_eq!(
            windows(&days[0]),
            vec![(600, Some(900)), (600, Some(900)), (240, Some(900))]
        );
        assert_eq!(windows(&days[1]), vec![(600, Some(900)), (100, Some(900))]);
        assert_eq!(days[1].end, at(4, 21, 40));
    }

    #[test]
    fn split_segment_keeps_its_span() {
        let table = TariffTable::new(vec![base(None)]);
        let segments = Decomposer::new(&table).segments(at(3, 10, 0), at(3, 14, 0));
        let (head, tail) = segments[0].split_at(90);

        assert_eq!((head.start, head.end, head.minutes), (at(3, 10, 0), at(3, 11, 30), 90));
        assert_eq!((tail.start, tail.end, tail.minutes), (at(3, 11, 30), at(3, 14, 0), 150));
    }

    #[test]
    fn stay_past_the_end_of_the_calendar_overflows() {
        let table = TariffTable::new(vec![base(None)]);
        let start = NaiveDateTime::MAX - chrono::Duration::minutes(10);

        assert_eq!(
            Decomposer::new(&table).decompose(start, 11).map(|chunk| chunk.minutes),
            Err(Error::NumericOverflow)
        );
    }
}
