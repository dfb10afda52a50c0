//! # Parking fees library
//!
//! Functionality to calculate the fee owed for a parking stay under a tariff table of per-unit,
//! progressive, capped and conditionally free rates. Normalize raw rates with
//! [`normalize::normalize`] and use the [`pricer::Pricer`] or [`compute_fee`] to perform the
//! actual calculation.

use std::fmt;

use chrono::NaiveDateTime;

/// Module for splitting a parking stay into billable chunks and segments.
pub mod interval;

/// Module containing the functionality to price parking stays with a tariff table.
pub mod pricer;

/// Raw, loosely typed tariff entries as received from an upstream store.
pub mod raw;

mod restriction;
pub mod tariff;

/// Module for generating human readable tariffs.
pub mod explain;

/// Module for normalizing raw tariff entries into typed rates.
pub mod normalize;

pub mod lint;

/// Money and clock time types used for calculations, serializing and deserializing.
pub mod types;

pub use interval::ParkingInterval;
pub use tariff::{Rate, RateKind, TariffTable};
pub use types::money::{Fee, Money};

type Result<T> = std::result::Result<T, Error>;

/// Compute the fee for parking from `start` until `end` under `table`.
///
/// Both timestamps are local clock times in the convention the tariff's time ranges assume.
/// An empty stay costs nothing; a stay for which no rate applies is [`Fee::Undetermined`].
pub fn compute_fee(table: &TariffTable, start: NaiveDateTime, end: NaiveDateTime) -> Result<Fee> {
    let interval = ParkingInterval::new(start, end)?;
    pricer::Pricer::new(table).fee(&interval)
}

/// Possible errors when pricing a parking stay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A tariff entry could not be turned into a rate.
    InvalidTariff {
        /// Position of the offending entry in the raw tariff.
        index: usize,
        reason: InvalidRate,
    },
    /// The end of the stay lies before its start.
    InvalidInterval,
    /// A numeric overflow occurred during fee calculation.
    NumericOverflow,
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTariff { index, reason } => {
                write!(f, "Invalid tariff entry at `$[{index}]`: {reason}")
            }
            Self::InvalidInterval => f.write_str("The parking stay ends before it starts"),
            Self::NumericOverflow => {
                f.write_str("A numeric overflow occurred during fee calculation")
            }
        }
    }
}

/// Reasons a single raw tariff entry is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidRate {
    /// The `type` field names no known kind of rate.
    UnknownType(String),
    /// A `base` or `progressive` rate has no billing unit.
    MissingUnitMinutes,
    /// The billing unit is zero.
    ZeroUnitMinutes,
    /// A billed or capping rate has no price.
    MissingPrice,
    /// A `progressive` rate does not say when it starts applying.
    MissingApplyAfter,
    /// A `conditionalFree` rate has no threshold.
    MissingThreshold,
    /// A numeric field holds something that is not a usable number.
    InvalidNumber {
        field: &'static str,
        value: String,
    },
    /// The time range is not of the form `HH:MM~HH:MM`.
    TimeRange(String),
    /// The day type is not recognized.
    DayType(String),
}

impl std::error::Error for InvalidRate {}

impl fmt::Display for InvalidRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType(kind) => write!(f, "unknown rate type `{kind}`"),
            Self::MissingUnitMinutes => f.write_str("`unitMinutes` is required"),
            Self::ZeroUnitMinutes => f.write_str("`unitMinutes` must be positive"),
            Self::MissingPrice => f.write_str("`price` is required"),
            Self::MissingApplyAfter => f.write_str("`applyAfter` is required on progressive rates"),
            Self::MissingThreshold => {
                f.write_str("`unitMinutes` is required as the threshold of a free rate")
            }
            Self::InvalidNumber { field, value } => {
                write!(f, "`{field}` has an invalid value `{value}`")
            }
            Self::TimeRange(range) => write!(f, "invalid time range `{range}`"),
            Self::DayType(day_type) => write!(f, "invalid day type `{day_type}`"),
        }
    }
}
