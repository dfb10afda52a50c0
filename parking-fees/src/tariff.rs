//! Typed tariff rates and the selection of the rates that apply at a given instant.

use std::{cmp::Reverse, num::NonZeroU32};

use serde::Serialize;

use crate::interval::Instant;
use crate::restriction::{collect_restrictions, Restriction};
use crate::types::{
    money::Money,
    time::{DayClass, DayType, TimeRange},
};

/// A single, validated tariff rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rate {
    #[serde(flatten)]
    pub kind: RateKind,
    /// Clock time window this rate is limited to.
    pub time_range: Option<TimeRange>,
    /// Days this rate is limited to, all days when absent.
    pub day_type: Option<DayType>,
}

/// The kinds of rate a tariff may contain, with the fields each kind requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RateKind {
    /// `price` for every started `unit_minutes`.
    Base {
        unit_minutes: NonZeroU32,
        price: Money,
    },
    /// Replaces the base price once `apply_after` minutes of the scope have passed.
    Progressive {
        unit_minutes: NonZeroU32,
        price: Money,
        apply_after: u32,
    },
    /// Caps the fee accumulated within `window` minutes, or without limit when `None`.
    Max {
        window: Option<NonZeroU32>,
        price: Money,
    },
    /// The whole stay is free when it lasts at most `threshold_minutes`.
    ConditionalFree { threshold_minutes: u32 },
}

impl Rate {
    /// The price charged or capped at by this rate.
    #[must_use]
    pub fn price(&self) -> Money {
        match self.kind {
            RateKind::Base { price, .. }
            | RateKind::Progressive { price, .. }
            | RateKind::Max { price, .. } => price,
            RateKind::ConditionalFree { .. } => Money::zero(),
        }
    }

    /// How narrowly this rate is scoped: a time range weighs twice as much as a day type.
    #[must_use]
    pub fn specificity(&self) -> u8 {
        let has_time_range = u8::from(self.time_range.is_some());
        let has_day_type = u8::from(self.day_type.as_ref().is_some_and(DayType::is_scoped));

        2 * has_time_range + has_day_type
    }

    /// Whether this rate applies at any time on any day.
    #[must_use]
    pub fn is_unscoped(&self) -> bool {
        self.specificity() == 0
    }
}

/// Select the rate that wins among `candidates`.
///
/// The most specific rate wins, then the lowest price, then the rate listed first.
pub(crate) fn most_specific<'a, I>(candidates: I) -> Option<(usize, &'a Rate)>
where
    I: IntoIterator<Item = (usize, &'a Rate)>,
{
    candidates
        .into_iter()
        .min_by_key(|&(index, rate)| (Reverse(rate.specificity()), rate.price(), index))
}

/// The rates of one parking spot.
#[derive(Debug, Clone)]
pub struct TariffTable {
    rates: Vec<Rate>,
    restrictions: Vec<Vec<Restriction>>,
}

impl TariffTable {
    #[must_use]
    pub fn new(rates: Vec<Rate>) -> Self {
        let restrictions = rates.iter().map(collect_restrictions).collect();

        Self {
            rates,
            restrictions,
        }
    }

    #[must_use]
    pub fn rates(&self) -> &[Rate] {
        &self.rates
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Whether any rate could ever produce or limit a charge.
    pub(crate) fn has_billing_rates(&self) -> bool {
        self.rates
            .iter()
            .any(|rate| !matches!(rate.kind, RateKind::ConditionalFree { .. }))
    }

    fn indexed(&self) -> impl Iterator<Item = (usize, &Rate)> + Clone {
        self.rates.iter().enumerate()
    }

    fn is_active(&self, index: usize, instant: &Instant) -> bool {
        self.restrictions[index]
            .iter()
            .all(|restriction| restriction.instant_validity(instant))
    }

    /// Select the base, progressive and max rate that apply at `instant`.
    pub(crate) fn active_rates(&self, instant: &Instant) -> ActiveRates {
        let active: Vec<_> = self
            .indexed()
            .filter(|&(index, _)| self.is_active(index, instant))
            .collect();

        let of_kind = |pred: fn(&RateKind) -> bool| {
            most_specific(active.iter().copied().filter(move |(_, rate)| pred(&rate.kind)))
        };

        ActiveRates {
            base: of_kind(|kind| matches!(kind, RateKind::Base { .. }))
                .and_then(|(index, rate)| UnitPrice::new(index, rate)),
            progressive: of_kind(|kind| matches!(kind, RateKind::Progressive { .. }))
                .and_then(|(index, rate)| ProgressivePrice::new(index, rate)),
            max: of_kind(|kind| matches!(kind, RateKind::Max { .. }))
                .and_then(|(index, rate)| Cap::new(index, rate)),
        }
    }

    /// The free rate applying at the start of a stay of `minutes`, if the stay is short enough.
    pub(crate) fn conditional_free(&self, instant: &Instant, minutes: u32) -> Option<usize> {
        self.indexed()
            .filter(|&(index, _)| self.is_active(index, instant))
            .find_map(|(index, rate)| match rate.kind {
                RateKind::ConditionalFree { threshold_minutes } if minutes <= threshold_minutes => {
                    Some(index)
                }
                _ => None,
            })
    }

    /// Caps without a time range or day type over a bounded window, longest window first.
    /// Only the cheapest cap is kept for each window length.
    pub(crate) fn cap_windows(&self) -> Vec<Cap> {
        let mut caps: Vec<Cap> = self
            .indexed()
            .filter(|(_, rate)| rate.is_unscoped())
            .filter_map(|(index, rate)| Cap::new(index, rate))
            .filter(|cap| cap.window.is_some())
            .collect();

        caps.sort_by_key(|cap| (Reverse(cap.window), cap.price, cap.rate_index));
        caps.dedup_by_key(|cap| cap.window);
        caps
    }

    /// Max rates without a time range whose window holds a stay of `minutes`.
    fn stay_level_caps(&self, minutes: u32) -> impl Iterator<Item = (usize, &Rate)> + Clone {
        self.indexed().filter(move |&(index, rate)| {
            rate.time_range.is_none()
                && Cap::new(index, rate).is_some_and(|cap| cap.covers(minutes))
        })
    }

    /// The cap over every minute a stay of `minutes` spends on days of `class`. Only rates
    /// scoped to that day class qualify.
    pub(crate) fn class_stay_cap(&self, class: DayClass, minutes: u32) -> Option<Cap> {
        let candidates = self.stay_level_caps(minutes).filter(|&(index, rate)| {
            !rate.is_unscoped()
                && self.restrictions[index]
                    .iter()
                    .all(|restriction| restriction.class_validity(class))
        });

        most_specific(candidates).and_then(|(index, rate)| Cap::new(index, rate))
    }

    /// The cap over a whole stay of `minutes`, regardless of the days it falls on.
    pub(crate) fn stay_cap(&self, minutes: u32) -> Option<Cap> {
        let candidates = self
            .stay_level_caps(minutes)
            .filter(|(_, rate)| rate.is_unscoped());

        most_specific(candidates).and_then(|(index, rate)| Cap::new(index, rate))
    }

    /// Whether the rate at `index` is limited to a time of day.
    pub(crate) fn is_time_ranged(&self, index: usize) -> bool {
        self.rates
            .get(index)
            .is_some_and(|rate| rate.time_range.is_some())
    }

    /// Every minute of the day, other than midnight, where some rate starts or stops applying.
    pub(crate) fn boundaries(&self) -> Vec<u32> {
        let mut boundaries: Vec<u32> = self
            .rates
            .iter()
            .filter_map(|rate| rate.time_range)
            .flat_map(|range| range.boundaries())
            .filter(|&minute| minute != 0)
            .collect();

        boundaries.sort_unstable();
        boundaries.dedup();
        boundaries
    }
}

/// The rates selected for a single segment.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ActiveRates {
    pub base: Option<UnitPrice>,
    pub progressive: Option<ProgressivePrice>,
    pub max: Option<Cap>,
}

/// A per-unit price taken from a base or progressive rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnitPrice {
    pub rate_index: usize,
    pub unit_minutes: NonZeroU32,
    pub price: Money,
}

impl UnitPrice {
    fn new(rate_index: usize, rate: &Rate) -> Option<Self> {
        match rate.kind {
            RateKind::Base {
                unit_minutes,
                price,
            } => Some(Self {
                rate_index,
                unit_minutes,
                price,
            }),
            _ => None,
        }
    }

    /// The charge for `minutes`, where every started unit is billed in full.
    #[must_use]
    pub fn bill(&self, minutes: u32) -> Money {
        self.price * u64::from(minutes.div_ceil(self.unit_minutes.get()))
    }
}

/// The price of a progressive rate and the point from which it applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressivePrice {
    #[serde(flatten)]
    pub unit: UnitPrice,
    pub apply_after: u32,
}

impl ProgressivePrice {
    fn new(rate_index: usize, rate: &Rate) -> Option<Self> {
        match rate.kind {
            RateKind::Progressive {
                unit_minutes,
                price,
                apply_after,
            } => Some(Self {
                unit: UnitPrice {
                    rate_index,
                    unit_minutes,
                    price,
                },
                apply_after,
            }),
            _ => None,
        }
    }
}

/// An upper bound on the fee accumulated over a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Cap {
    pub rate_index: usize,
    pub window: Option<NonZeroU32>,
    pub price: Money,
}

impl Cap {
    fn new(rate_index: usize, rate: &Rate) -> Option<Self> {
        match rate.kind {
            RateKind::Max { window, price } => Some(Self {
                rate_index,
                window,
                price,
            }),
            _ => None,
        }
    }

    /// Whether this cap may be applied to a stretch of `minutes`.
    #[must_use]
    pub fn covers(&self, minutes: u32) -> bool {
        self.window.map_or(true, |window| window.get() >= minutes)
    }
}
