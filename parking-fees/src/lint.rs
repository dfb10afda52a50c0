use std::fmt::Display;

use crate::{
    interval::Instant,
    tariff::{RateKind, TariffTable},
    types::time::{ClockTime, DayClass, DayOfWeek, TimeRange, MINS_IN_DAY},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Another rate of the same kind wins wherever this rate applies.
    RateIsShadowed { index: usize },
    /// A progressive rate applies where no base rate covers the minutes before it starts.
    ProgressiveWithoutBase { index: usize },
    /// No base or progressive rate applies during `range` on `days` of `day_class`.
    RateGap {
        day_class: DayClass,
        days: Vec<DayOfWeek>,
        range: TimeRange,
    },
    FreeThresholdIsZero { index: usize },
}

impl Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateIsShadowed { index } => write!(
                f,
                "Rate at `$[{index}]` is never applied, consider removing it."
            ),
            Self::ProgressiveWithoutBase { index } => write!(
                f,
                "Progressive rate at `$[{index}]` has no base rate for the minutes before it applies, \
                   consider adding a fallback base rate."
            ),
            Self::RateGap {
                day_class,
                days,
                range,
            } => {
                let days: Vec<_> = days.iter().map(|day| format!("{day:?}")).collect();
                write!(
                    f,
                    "No rate applies between {range} on {day_class} {}, consider adding a fallback rate.",
                    days.join(", ")
                )
            }
            Self::FreeThresholdIsZero { index } => write!(
                f,
                "Free rate at `$[{index}]` has a threshold of zero minutes and never applies."
            ),
        }
    }
}

/// Lint the provided tariff table and produce a set of relevant warnings.
///
/// Every day of the week, as a weekday and as a holiday, is cut into the clock slots between
/// the boundaries of the table's time ranges. Within one such cell the same rates apply, so
/// evaluating each cell once tells which rates are ever selected and where none is.
pub fn lint(tariff: &TariffTable) -> Vec<Warning> {
    let mut warnings = Vec::new();
    let mut selected = vec![false; tariff.len()];
    let mut progressive_without_base = vec![false; tariff.len()];
    let mut gaps: Vec<Gap> = Vec::new();

    for (index, rate) in tariff.rates().iter().enumerate() {
        if let RateKind::ConditionalFree { threshold_minutes } = rate.kind {
            selected[index] = true;

            if threshold_minutes == 0 {
                warnings.push(Warning::FreeThresholdIsZero { index });
            }
        }
    }

    for cap in stay_level_caps(tariff) {
        selected[cap] = true;
    }

    let slots = slots(&tariff.boundaries());

    for (day, day_class) in cells() {
        let mut open_gap: Option<u32> = None;

        for &(start, end) in &slots {
            let active = tariff.active_rates(&Instant {
                minute_of_day: start,
                weekday: day.into(),
                day_class,
            });

            for index in [
                active.base.map(|rate| rate.rate_index),
                active.progressive.map(|rate| rate.unit.rate_index),
                active.max.map(|rate| rate.rate_index),
            ]
            .into_iter()
            .flatten()
            {
                selected[index] = true;
            }

            if let (None, Some(progressive)) = (active.base, active.progressive) {
                if progressive.apply_after > 0 {
                    progressive_without_base[progressive.unit.rate_index] = true;
                }
            }

            let resolved = active.base.is_some() || active.progressive.is_some();

            match (resolved, open_gap) {
                (false, None) => open_gap = Some(start),
                (true, Some(gap_start)) => {
                    add_gap(&mut gaps, day, day_class, gap_start, start);
                    open_gap = None;
                }
                _ => {}
            }
        }

        if let Some(gap_start) = open_gap {
            add_gap(&mut gaps, day, day_class, gap_start, MINS_IN_DAY);
        }
    }

    for (index, is_selected) in selected.into_iter().enumerate() {
        if !is_selected {
            warnings.push(Warning::RateIsShadowed { index });
        }
    }

    for (index, flagged) in progressive_without_base.into_iter().enumerate() {
        if flagged {
            warnings.push(Warning::ProgressiveWithoutBase { index });
        }
    }

    for gap in gaps {
        let (Some(start), Some(end)) = (
            ClockTime::from_minutes(gap.start),
            ClockTime::from_minutes(gap.end),
        ) else {
            continue;
        };

        warnings.push(Warning::RateGap {
            day_class: gap.day_class,
            days: gap.days,
            range: TimeRange::new(start, end),
        });
    }

    warnings
}

/// Max rates that cap whole windows or stays rather than the segments selecting them.
///
/// Stays are sampled at one minute and just past every bounded window, the lengths at which the
/// winning cap can change.
fn stay_level_caps(tariff: &TariffTable) -> Vec<usize> {
    let mut caps: Vec<usize> = tariff.cap_windows().iter().map(|cap| cap.rate_index).collect();

    let lengths = tariff.rates().iter().filter_map(|rate| match rate.kind {
        RateKind::Max {
            window: Some(window),
            ..
        } => Some(window.get().saturating_add(1)),
        _ => None,
    });

    for minutes in std::iter::once(1).chain(lengths) {
        caps.extend(tariff.stay_cap(minutes).map(|cap| cap.rate_index));

        for class in [DayClass::Weekday, DayClass::WeekendHoliday] {
            caps.extend(tariff.class_stay_cap(class, minutes).map(|cap| cap.rate_index));
        }
    }

    caps
}

/// Uncovered minutes `start..end`, shared by all of `days`.
struct Gap {
    day_class: DayClass,
    start: u32,
    end: u32,
    days: Vec<DayOfWeek>,
}

fn add_gap(gaps: &mut Vec<Gap>, day: DayOfWeek, day_class: DayClass, start: u32, end: u32) {
    let existing = gaps
        .iter_mut()
        .find(|gap| gap.day_class == day_class && gap.start == start && gap.end == end);

    match existing {
        Some(gap) => gap.days.push(day),
        None => gaps.push(Gap {
            day_class,
            start,
            end,
            days: vec![day],
        }),
    }
}

/// Every combination of day of the week and the classes it can have. Saturdays and Sundays are
/// always weekend days, any other day may also be a holiday.
fn cells() -> impl Iterator<Item = (DayOfWeek, DayClass)> {
    DayOfWeek::ALL.into_iter().flat_map(|day| {
        let classes: &[DayClass] = if day.is_weekend() {
            &[DayClass::WeekendHoliday]
        } else {
            &[DayClass::Weekday, DayClass::WeekendHoliday]
        };

        classes.iter().map(move |&class| (day, class))
    })
}

/// Cut the day at `boundaries` into consecutive `(start, end)` minute slots.
fn slots(boundaries: &[u32]) -> Vec<(u32, u32)> {
    let mut starts = vec![0];
    starts.extend(boundaries.iter().copied().filter(|&minute| minute < MINS_IN_DAY));

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| (start, starts.get(i + 1).copied().unwrap_or(MINS_IN_DAY)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{lint, slots, Warning};
    use crate::{
        normalize::normalize,
        raw::RawTariff,
        types::time::{DayClass, DayOfWeek},
        TariffTable,
    };

    fn table(json: &str) -> TariffTable {
        let raw: RawTariff = serde_json::from_str(json).unwrap();
        normalize(raw.rates()).unwrap()
    }

    #[test]
    fn complete_table_has_no_warnings() {
        let warnings = lint(&table(
            r#"[
                { "type": "base", "unitMinutes": 30, "price": 200 },
                { "type": "base", "unitMinutes": 30, "price": 100, "dayType": "weekend" },
                { "type": "base", "unitMinutes": 60, "price": 100, "timeRange": "22:00~8:00" },
                { "type": "max", "unitMinutes": 1440, "price": 2000 }
            ]"#,
        ));

        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn more_expensive_duplicate_is_shadowed() {
        let warnings = lint(&table(
            r#"[
                { "type": "base", "unitMinutes": 30, "price": 200 },
                { "type": "base", "unitMinutes": 30, "price": 300 }
            ]"#,
        ));

        assert_eq!(warnings, vec![Warning::RateIsShadowed { index: 1 }]);
    }

    #[test]
    fn daytime_only_table_has_gaps_at_night() {
        let warnings = lint(&table(
            r#"[{ "type": "base", "unitMinutes": 30, "price": 200, "timeRange": "08:00~20:00" }]"#,
        ));

        assert_eq!(warnings.len(), 4);
        assert_eq!(
            warnings[0],
            Warning::RateGap {
                day_class: DayClass::Weekday,
                days: DayOfWeek::ALL[..5].to_vec(),
                range: "00:00~08:00".parse().unwrap(),
            }
        );
        assert_eq!(
            warnings[3].to_string(),
            "No rate applies between 20:00~24:00 on weekend/holiday Monday, Tuesday, Wednesday, \
             Thursday, Friday, Saturday, Sunday, consider adding a fallback rate."
        );
    }

    #[test]
    fn progressive_needs_a_base_rate() {
        let warnings = lint(&table(
            r#"[{ "type": "progressive", "unitMinutes": 20, "price": 120, "applyAfter": 60 }]"#,
        ));

        assert_eq!(warnings, vec![Warning::ProgressiveWithoutBase { index: 0 }]);
    }

    #[test]
    fn zero_free_threshold_is_flagged() {
        let warnings = lint(&table(
            r#"[
                { "type": "free", "unitMinutes": 0 },
                { "type": "base", "unitMinutes": 30, "price": 200 }
            ]"#,
        ));

        assert_eq!(warnings, vec![Warning::FreeThresholdIsZero { index: 0 }]);
    }

    #[test]
    fn caps_over_whole_windows_are_used() {
        let warnings = lint(&table(
            r#"[
                { "type": "base", "unitMinutes": 30, "price": 200 },
                { "type": "max", "unitMinutes": 60, "price": 300 },
                { "type": "max", "unitMinutes": 1440, "price": 1500 }
            ]"#,
        ));

        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn pricier_duplicate_cap_is_shadowed() {
        let warnings = lint(&table(
            r#"[
                { "type": "base", "unitMinutes": 30, "price": 200 },
                { "type": "max", "unitMinutes": 1440, "price": 2000 },
                { "type": "max", "unitMinutes": 1440, "price": 1800 }
            ]"#,
        ));

        assert_eq!(warnings, vec![Warning::RateIsShadowed { index: 1 }]);
    }

    #[test]
    fn slots_cover_the_whole_day() {
        assert_eq!(slots(&[]), vec![(0, 1440)]);
        assert_eq!(slots(&[480, 1320]), vec![(0, 480), (480, 1320), (1320, 1440)]);
    }
}
