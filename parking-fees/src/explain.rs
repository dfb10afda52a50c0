use crate::{
    tariff::{Rate, RateKind, TariffTable},
    types::time::{DayType, TimeRange, MINS_IN_DAY, MINS_IN_HOUR},
};

#[derive(Debug)]
pub struct Explain {
    pub rates: Vec<ExplainRate>,
}

#[derive(Debug)]
pub struct ExplainRate {
    /// Position of the rate in the table.
    pub index: usize,
    pub description: String,
    pub restrictions: Vec<String>,
}

pub fn explain(tariff: &TariffTable) -> Explain {
    let rates = tariff
        .rates()
        .iter()
        .enumerate()
        .map(|(index, rate)| ExplainRate {
            index,
            description: explain_kind(&rate.kind),
            restrictions: explain_restrictions(rate),
        })
        .collect();

    Explain { rates }
}

/// Explain what the given kind of rate charges.
pub fn explain_kind(kind: &RateKind) -> String {
    match *kind {
        RateKind::Base {
            unit_minutes,
            price,
        } => format!("{price} per {}", duration(unit_minutes.get())),
        RateKind::Progressive {
            unit_minutes,
            price,
            apply_after,
        } => format!(
            "{price} per {} after the first {}",
            duration(unit_minutes.get()),
            duration(apply_after)
        ),
        RateKind::Max {
            window: Some(window),
            price,
        } => format!("at most {price} per {}", duration(window.get())),
        RateKind::Max {
            window: None,
            price,
        } => format!("at most {price} in total"),
        RateKind::ConditionalFree { threshold_minutes } => {
            format!("free for stays of at most {}", duration(threshold_minutes))
        }
    }
}

/// Explain the restrictions of the given rate.
pub fn explain_restrictions(rate: &Rate) -> Vec<String> {
    let mut explains = Vec::new();

    if let Some(range) = rate.time_range {
        explains.push(explain_time_range(range));
    }

    match &rate.day_type {
        Some(DayType::Daily) | None => {}
        Some(day_type) => explains.push(format!("on {day_type}")),
    }

    explains
}

fn explain_time_range(range: TimeRange) -> String {
    if range.start() == range.end() {
        "at any time of day".to_owned()
    } else if range.is_wrapping() {
        format!("between {} and {} the next day", range.start(), range.end())
    } else {
        format!("between {} and {}", range.start(), range.end())
    }
}

fn duration(minutes: u32) -> String {
    match minutes {
        0 => "0 minutes".to_owned(),
        MINS_IN_DAY => "day".to_owned(),
        m if m % MINS_IN_DAY == 0 => format!("{} days", m / MINS_IN_DAY),
        MINS_IN_HOUR => "hour".to_owned(),
        m if m % MINS_IN_HOUR == 0 => format!("{} hours", m / MINS_IN_HOUR),
        1 => "minute".to_owned(),
        m => format!("{m} minutes"),
    }
}
