use std::{fmt, num::NonZeroU32};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    interval::{
        Calendar, Chunk, ChunkKind, Decomposer, Instant, ParkingInterval, Parts, TimeSegment,
    },
    tariff::{ActiveRates, Cap, TariffTable, UnitPrice},
    types::{
        money::{Fee, Money},
        time::DayClass,
    },
    Result,
};

/// Pricer that encapsulates a tariff table and the calendar its day types are evaluated against.
/// To run the pricer call `build_report` or, when only the amount is needed, `fee`. The report
/// contains the fee, the subtotals and a breakdown of the calculation.
///
/// ```ignore
/// let pricer = Pricer::new(&table).with_holidays(holidays);
/// let report = pricer.build_report(&interval)?;
/// ```
pub struct Pricer<'a> {
    tariff: &'a TariffTable,
    calendar: Calendar,
}

impl<'a> Pricer<'a> {
    /// Instantiate the pricer for `tariff`, treating only Saturdays and Sundays as weekend.
    #[must_use]
    pub fn new(tariff: &'a TariffTable) -> Self {
        Self {
            tariff,
            calendar: Calendar::default(),
        }
    }

    /// Classify `holidays` as weekend/holiday days.
    #[must_use]
    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.calendar = Calendar::new(holidays);
        self
    }

    /// The fee owed for `interval`. Unlike `build_report` no breakdown is collected.
    pub fn fee(&self, interval: &ParkingInterval) -> Result<Fee> {
        self.price(interval, false).map(|report| report.fee)
    }

    /// Price `interval` and build a report containing the results.
    pub fn build_report(&self, interval: &ParkingInterval) -> Result<Report> {
        self.price(interval, true)
    }

    fn price(&self, interval: &ParkingInterval, breakdown: bool) -> Result<Report> {
        let start = interval.billed_start();
        let total_minutes = interval.billed_minutes()?;

        let mut report = Report::new(total_minutes);

        if total_minutes == 0 {
            report.fee = Fee::Amount(Money::zero());
            return Ok(report);
        }

        if let Some(index) = self
            .tariff
            .conditional_free(&self.calendar.instant(start), total_minutes)
        {
            debug!(rate = index, total_minutes, "stay is free of charge");
            report.conditional_free = Some(index);
            report.fee = Fee::Amount(Money::zero());
            return Ok(report);
        }

        if !self.tariff.has_billing_rates() {
            debug!("tariff table has no billing rates");
            return Ok(report);
        }

        let root = Decomposer::new(self.tariff).decompose(start, total_minutes)?;

        let mut billing = Billing {
            pricer: self,
            report: &mut report,
            breakdown,
            resolved: false,
            class_minutes: ClassMinutes::default(),
        };

        let mut shares = billing.price_chunk(&root, 0);
        let resolved = billing.resolved;
        let class_minutes = billing.class_minutes;
        let dominant = class_minutes.dominant(self.calendar.day_class(start.date()));
        let subtotal = Share::total(&shares);

        for class in [DayClass::Weekday, DayClass::WeekendHoliday] {
            let Some(cap) = self.tariff.class_stay_cap(class, total_minutes) else {
                continue;
            };
            let Some(first) = shares.iter().find(|share| share.class == class) else {
                continue;
            };
            let first_start = first.start;

            let (before, after) = Share::clamp(
                shares.iter_mut().filter(|share| share.class == class),
                cap.price,
            );

            report.stay_caps.push(cap);

            if after < before {
                report.applied_caps.push(AppliedCap {
                    stage: CapStage::Stay,
                    rate_index: cap.rate_index,
                    start: first_start,
                    minutes: class_minutes.of(class),
                    before,
                    after,
                });
            }
        }

        if let Some(cap) = self.tariff.stay_cap(total_minutes) {
            let (before, after) = Share::clamp(shares.iter_mut(), cap.price);

            report.stay_caps.push(cap);

            if after < before {
                report.applied_caps.push(AppliedCap {
                    stage: CapStage::Stay,
                    rate_index: cap.rate_index,
                    start,
                    minutes: total_minutes,
                    before,
                    after,
                });
            }
        }

        let total = Share::total(&shares);

        debug!(%subtotal, %total, ?dominant, "priced stay");

        report.subtotal = subtotal;
        report.dominant_day_class = Some(dominant);
        report.fee = if resolved {
            Fee::Amount(total)
        } else {
            Fee::Undetermined
        };

        Ok(report)
    }
}

/// The fee of a segment after the caps applied so far.
#[derive(Debug, Clone, Copy)]
struct Share {
    start: NaiveDateTime,
    class: DayClass,
    fee: Money,
}

impl Share {
    fn total(shares: &[Self]) -> Money {
        shares.iter().map(|share| share.fee).sum()
    }

    /// Lower `shares` so they sum to at most `limit`. The earliest fees are kept whole, so a
    /// longer stretch never keeps less of its earlier minutes than a shorter one.
    ///
    /// Returns the sum before and after.
    fn clamp<'s>(shares: impl IntoIterator<Item = &'s mut Self>, limit: Money) -> (Money, Money) {
        let mut before = Money::zero();
        let mut after = Money::zero();

        for share in shares {
            before += share.fee;
            share.fee = share.fee.capped(Some(limit.saturating_sub(after)));
            after += share.fee;
        }

        (before, after)
    }
}

/// State of pricing a single stay.
struct Billing<'p, 'a> {
    pricer: &'p Pricer<'a>,
    report: &'p mut Report,
    /// Whether chunks and segments are added to the report.
    breakdown: bool,
    /// Whether any segment selected a base or progressive rate.
    resolved: bool,
    class_minutes: ClassMinutes,
}

impl Billing<'_, '_> {
    /// Price a chunk and everything below it, returning the capped fee of each segment.
    fn price_chunk(&mut self, chunk: &Chunk, depth: usize) -> Vec<Share> {
        let position = self.report.chunks.len();

        if self.breakdown {
            self.report.chunks.push(ChunkReport::new(chunk, depth));
        }

        let mut shares: Vec<Share> = match &chunk.parts {
            Parts::Windows(windows) => windows
                .iter()
                .flat_map(|window| self.price_chunk(window, depth + 1))
                .collect(),
            Parts::Segments(segments) => self.price_segments(segments),
        };

        let subtotal = Share::total(&shares);

        if let Some(cap) = chunk.cap {
            let (before, after) = Share::clamp(shares.iter_mut(), cap.price);

            if after < before {
                self.applied(CapStage::Window, cap, chunk.start, chunk.minutes, before, after);
            }
        }

        if self.breakdown {
            let fee = Share::total(&shares);

            if let Some(chunk_report) = self.report.chunks.get_mut(position) {
                chunk_report.subtotal = subtotal;
                chunk_report.fee = fee;
            }
        }

        shares
    }

    /// Select the rates of every segment of a leaf chunk. Segments selecting the same max rate
    /// form a run, and a run is cut every time it fills the window of a bounded cap.
    fn select(&self, segments: &[TimeSegment]) -> Vec<Selected> {
        let tariff = self.pricer.tariff;

        let mut selected = Vec::with_capacity(segments.len());
        let mut run = 0;
        let mut run_minutes = 0;
        let mut previous_max = None;

        for &segment in segments {
            let instant = self.pricer.calendar.instant(segment.start);
            let active = tariff.active_rates(&instant);
            let max_index = active.max.map(|cap| cap.rate_index);

            if previous_max.is_some_and(|previous| previous != max_index) {
                run += 1;
                run_minutes = 0;
            }
            previous_max = Some(max_index);

            let window = active.max.and_then(|cap| cap.window).map(NonZeroU32::get);
            let mut rest = segment;

            loop {
                let room = window.map_or(u32::MAX, |window| window.saturating_sub(run_minutes));

                if room == 0 {
                    run += 1;
                    run_minutes = 0;
                    continue;
                }

                if rest.minutes <= room {
                    run_minutes += rest.minutes;
                    selected.push(Selected {
                        segment: rest,
                        instant,
                        active,
                        run,
                    });
                    break;
                }

                let (head, tail) = rest.split_at(room);
                selected.push(Selected {
                    segment: head,
                    instant,
                    active,
                    run,
                });
                run += 1;
                run_minutes = 0;
                rest = tail;
            }
        }

        selected
    }

    /// Price the segments of a leaf chunk, applying the caps selected per segment.
    fn price_segments(&mut self, segments: &[TimeSegment]) -> Vec<Share> {
        let tariff = self.pricer.tariff;

        let mut base_meter = Meter::default();
        let mut progressive_meter = Meter::default();
        let mut elapsed: Option<(usize, u32)> = None;
        let mut day: Option<NaiveDate> = None;
        let mut shares = Vec::new();
        let mut runs: Vec<Run> = Vec::new();

        for selected in self.select(segments) {
            let Selected {
                segment,
                instant,
                active,
                run,
            } = selected;

            let date = segment.start.date();

            // A progressive rate without a time range counts its minutes per day.
            if day.replace(date).is_some_and(|previous| previous != date)
                && elapsed.is_some_and(|(index, _)| !tariff.is_time_ranged(index))
            {
                elapsed = None;
                progressive_meter = Meter::default();
            }

            self.class_minutes.add(instant.day_class, segment.minutes);

            let (base_minutes, progressive_minutes) = match active.progressive {
                Some(progressive) => {
                    let index = progressive.unit.rate_index;
                    let since = match elapsed {
                        Some((current, minutes)) if current == index => minutes,
                        _ => 0,
                    };
                    let before = progressive
                        .apply_after
                        .saturating_sub(since)
                        .min(segment.minutes);

                    elapsed = Some((index, since.saturating_add(segment.minutes)));
                    (before, segment.minutes - before)
                }
                None => {
                    elapsed = None;
                    (segment.minutes, 0)
                }
            };

            let mut fee = Money::zero();

            match active.base {
                Some(base) => fee += base_meter.advance(base, base_minutes),
                None => {
                    base_meter = Meter::default();

                    if base_minutes > 0 {
                        self.unresolved(&segment, base_minutes);
                    }
                }
            }

            match active.progressive {
                Some(progressive) => {
                    fee += progressive_meter.advance(progressive.unit, progressive_minutes);
                }
                None => progressive_meter = Meter::default(),
            }

            if active.base.is_some() || active.progressive.is_some() {
                self.resolved = true;
            }

            debug!(
                start = %segment.start,
                minutes = segment.minutes,
                base = ?active.base.map(|rate| rate.rate_index),
                progressive = ?active.progressive.map(|rate| rate.unit.rate_index),
                max = ?active.max.map(|rate| rate.rate_index),
                %fee,
                "resolved segment"
            );

            match runs.last_mut() {
                Some(last) if last.id == run => last.minutes += segment.minutes,
                _ => runs.push(Run {
                    id: run,
                    cap: active.max,
                    start: segment.start,
                    minutes: segment.minutes,
                    first: shares.len(),
                }),
            }

            shares.push(Share {
                start: segment.start,
                class: instant.day_class,
                fee,
            });

            if self.breakdown {
                self.report.segments.push(SegmentReport {
                    start: segment.start,
                    end: segment.end,
                    minutes: segment.minutes,
                    day_class: instant.day_class,
                    base: active.base.map(|rate| rate.rate_index),
                    progressive: active.progressive.map(|rate| rate.unit.rate_index),
                    max: active.max.map(|rate| rate.rate_index),
                    base_minutes,
                    progressive_minutes,
                    fee,
                });
            }
        }

        let mut ends = runs.iter().skip(1).map(|run| run.first).chain([shares.len()]);

        for run in &runs {
            let end = ends.next().unwrap_or(shares.len());

            let Some(cap) = run.cap else {
                continue;
            };

            let (before, after) = Share::clamp(&mut shares[run.first..end], cap.price);

            if after < before {
                self.applied(CapStage::Run, cap, run.start, run.minutes, before, after);
            }
        }

        shares
    }

    fn applied(
        &mut self,
        stage: CapStage,
        cap: Cap,
        start: NaiveDateTime,
        minutes: u32,
        before: Money,
        after: Money,
    ) {
        debug!(?stage, rate = cap.rate_index, %start, minutes, %before, %after, "applied cap");

        self.report.applied_caps.push(AppliedCap {
            stage,
            rate_index: cap.rate_index,
            start,
            minutes,
            before,
            after,
        });
    }

    /// Record the first `minutes` of `segment` as not charged.
    fn unresolved(&mut self, segment: &TimeSegment, minutes: u32) {
        let start = segment.start;
        let (head, _) = segment.split_at(minutes);
        let end = head.end;

        warn!(%start, %end, minutes, "no rate applies to segment");

        self.report
            .warnings
            .push(Warning::UnresolvedSegment { start, end, minutes });
    }
}

/// A segment with the rates selected for it and the run it belongs to.
struct Selected {
    segment: TimeSegment,
    instant: Instant,
    active: ActiveRates,
    run: usize,
}

/// Bills consecutive stretches under the same unit price as one, so a split segment does not
/// round up twice.
#[derive(Debug, Default)]
struct Meter {
    rate_index: Option<usize>,
    minutes: u32,
}

impl Meter {
    /// The additional charge for `minutes` more under `price`.
    fn advance(&mut self, price: UnitPrice, minutes: u32) -> Money {
        if self.rate_index != Some(price.rate_index) {
            *self = Self {
                rate_index: Some(price.rate_index),
                minutes: 0,
            };
        }

        let before = price.bill(self.minutes);
        self.minutes = self.minutes.saturating_add(minutes);
        price.bill(self.minutes).saturating_sub(before)
    }
}

/// Consecutive segments of a leaf chunk that selected the same max rate, or none, and fit
/// within its window. `first` is the position of its first segment.
struct Run {
    id: usize,
    cap: Option<Cap>,
    start: NaiveDateTime,
    minutes: u32,
    first: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct ClassMinutes {
    weekday: u32,
    weekend_holiday: u32,
}

impl ClassMinutes {
    fn add(&mut self, class: DayClass, minutes: u32) {
        let counter = match class {
            DayClass::Weekday => &mut self.weekday,
            DayClass::WeekendHoliday => &mut self.weekend_holiday,
        };

        *counter = counter.saturating_add(minutes);
    }

    fn of(self, class: DayClass) -> u32 {
        match class {
            DayClass::Weekday => self.weekday,
            DayClass::WeekendHoliday => self.weekend_holiday,
        }
    }

    /// The class with the most minutes, `tie` when both have as many.
    fn dominant(self, tie: DayClass) -> DayClass {
        match self.weekday.cmp(&self.weekend_holiday) {
            std::cmp::Ordering::Greater => DayClass::Weekday,
            std::cmp::Ordering::Less => DayClass::WeekendHoliday,
            std::cmp::Ordering::Equal => tie,
        }
    }
}

/// Structure containing a parking stay priced according to a tariff table.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// The fee owed for the stay.
    pub fee: Fee,
    /// Billed duration of the stay, in whole minutes.
    pub total_minutes: u32,
    /// The day class most of the stay fell on. `None` when no segment was priced.
    pub dominant_day_class: Option<DayClass>,
    /// Index of the free rate that made the stay free of charge.
    pub conditional_free: Option<usize>,
    /// The stay and every cap window it was split into, outermost first.
    pub chunks: Vec<ChunkReport>,
    /// Every priced segment in chronological order. A segment is cut where a bounded cap's
    /// window ends.
    pub segments: Vec<SegmentReport>,
    /// The fee before the caps over the whole stay.
    pub subtotal: Money,
    /// The caps over the whole stay: at most one per day class, limiting the minutes on that
    /// class, followed by at most one limiting everything.
    pub stay_caps: Vec<Cap>,
    /// Every cap that lowered a fee, innermost first.
    pub applied_caps: Vec<AppliedCap>,
    pub warnings: Vec<Warning>,
}

impl Report {
    fn new(total_minutes: u32) -> Self {
        Self {
            fee: Fee::Undetermined,
            total_minutes,
            dominant_day_class: None,
            conditional_free: None,
            chunks: Vec::new(),
            segments: Vec::new(),
            subtotal: Money::zero(),
            stay_caps: Vec::new(),
            applied_caps: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// The stages at which caps are applied, from innermost to outermost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapStage {
    /// Consecutive segments that selected the same max rate.
    Run,
    /// A cap window such as a rolling window or a day, or a stay that fits one.
    Window,
    /// The whole stay, or all of its minutes on one day class.
    Stay,
}

/// A cap that lowered the fee of a stretch of the stay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedCap {
    pub stage: CapStage,
    /// Index of the max rate in the table.
    pub rate_index: usize,
    pub start: NaiveDateTime,
    pub minutes: u32,
    pub before: Money,
    pub after: Money,
}

/// A report for the stay or one of its cap windows.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkReport {
    pub kind: ChunkKind,
    /// Nesting level, zero for the stay itself.
    pub depth: usize,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub minutes: u32,
    /// The cap over this chunk as a whole.
    pub cap: Option<Cap>,
    /// Sum of the fees within the chunk.
    pub subtotal: Money,
    /// The subtotal after applying `cap`.
    pub fee: Money,
}

impl ChunkReport {
    fn new(chunk: &Chunk, depth: usize) -> Self {
        Self {
            kind: chunk.kind,
            depth,
            start: chunk.start,
            end: chunk.end,
            minutes: chunk.minutes,
            cap: chunk.cap,
            subtotal: Money::zero(),
            fee: Money::zero(),
        }
    }
}

/// A report for a single segment of the stay. Rates are referred to by their index in the table.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub minutes: u32,
    pub day_class: DayClass,
    /// The base rate that was selected, if any.
    pub base: Option<usize>,
    /// The progressive rate that was selected, if any.
    pub progressive: Option<usize>,
    /// The max rate that was selected, if any.
    pub max: Option<usize>,
    /// Minutes billed at the base rate.
    pub base_minutes: u32,
    /// Minutes billed at the progressive rate.
    pub progressive_minutes: u32,
    /// The fee of this segment before any cap.
    pub fee: Money,
}

/// Conditions noticed while pricing that did not prevent a fee from being computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// No base or progressive rate applies to part of the stay, it was not charged.
    UnresolvedSegment {
        start: NaiveDateTime,
        end: NaiveDateTime,
        minutes: u32,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedSegment { start, end, minutes } => write!(
                f,
                "No rate applies from {start} until {end}, {minutes} minutes were not charged"
            ),
        }
    }
}
