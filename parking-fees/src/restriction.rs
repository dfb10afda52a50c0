use crate::interval::Instant;
use crate::tariff::Rate;
use crate::types::time::{DayClass, DayType, TimeRange};

pub fn collect_restrictions(rate: &Rate) -> Vec<Restriction> {
    let mut collected = Vec::new();

    if let Some(range) = rate.time_range {
        collected.push(Restriction::Time(range));
    }

    match &rate.day_type {
        Some(DayType::Daily) | None => {}
        Some(day_type) => collected.push(Restriction::Day(day_type.clone())),
    }

    collected
}

#[derive(Debug, Clone)]
pub enum Restriction {
    /// Valid within a window of the day, which may wrap past midnight.
    Time(TimeRange),
    Day(DayType),
}

impl Restriction {
    /// Checks if this restriction holds at `instant`. Time ranges include their start and
    /// exclude their end.
    pub fn instant_validity(&self, instant: &Instant) -> bool {
        match self {
            Self::Time(range) => range.contains(instant.minute_of_day),
            Self::Day(day_type) => day_type.matches(instant.day_class, instant.weekday),
        }
    }

    /// Checks if this restriction holds on every day of `class`, regardless of the time.
    pub fn class_validity(&self, class: DayClass) -> bool {
        match self {
            Self::Time(_) => false,
            Self::Day(day_type) => day_type.covers_class(class),
        }
    }
}
