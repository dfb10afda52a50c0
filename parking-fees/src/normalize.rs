use std::num::NonZeroU32;

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use tracing::debug;

use crate::{
    raw::{RawDayType, RawNumber, RawRate},
    tariff::{Rate, RateKind, TariffTable},
    types::{money::Money, time::DayType},
    Error, InvalidRate, Result,
};

/// Validate and classify raw tariff entries into a [`TariffTable`].
///
/// Every entry must produce a rate; the first entry that cannot be billed reliably fails the
/// whole table with [`Error::InvalidTariff`].
pub fn normalize(raw: &[RawRate]) -> Result<TariffTable> {
    let rates = raw
        .iter()
        .enumerate()
        .map(|(index, rate)| {
            normalize_rate(rate).map_err(|reason| Error::InvalidTariff { index, reason })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(rates = rates.len(), "normalized tariff table");

    Ok(TariffTable::new(rates))
}

/// Turn a single raw entry into a rate.
pub fn normalize_rate(raw: &RawRate) -> std::result::Result<Rate, InvalidRate> {
    let kind = match rate_type(raw.rate_type.as_deref())? {
        RateType::Base => RateKind::Base {
            unit_minutes: unit_minutes(raw.unit_minutes.as_ref())?,
            price: price(raw.price.as_ref())?,
        },
        RateType::Progressive => RateKind::Progressive {
            unit_minutes: unit_minutes(raw.unit_minutes.as_ref())?,
            price: price(raw.price.as_ref())?,
            apply_after: raw
                .apply_after
                .as_ref()
                .ok_or(InvalidRate::MissingApplyAfter)
                .and_then(|value| whole_minutes("applyAfter", value))?,
        },
        RateType::Max => RateKind::Max {
            window: raw
                .unit_minutes
                .as_ref()
                .map(|value| whole_minutes("unitMinutes", value))
                .transpose()?
                .and_then(NonZeroU32::new),
            price: price(raw.price.as_ref())?,
        },
        RateType::ConditionalFree => RateKind::ConditionalFree {
            threshold_minutes: raw
                .unit_minutes
                .as_ref()
                .ok_or(InvalidRate::MissingThreshold)
                .and_then(|value| whole_minutes("unitMinutes", value))?,
        },
    };

    let time_range = raw
        .time_range
        .as_deref()
        .map(str::trim)
        .filter(|range| !range.is_empty())
        .map(str::parse)
        .transpose()?;

    let day_type = raw.day_type.as_ref().map(day_type).transpose()?;

    Ok(Rate {
        kind,
        time_range,
        day_type,
    })
}

enum RateType {
    Base,
    Progressive,
    Max,
    ConditionalFree,
}

fn rate_type(name: Option<&str>) -> std::result::Result<RateType, InvalidRate> {
    let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) else {
        return Ok(RateType::Base);
    };

    let normalized: String = name
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .collect::<String>()
        .to_ascii_lowercase();

    let rate_type = match normalized.as_str() {
        "base" | "basic" | "normal" | "standard" => RateType::Base,
        "progressive" | "additional" | "after" => RateType::Progressive,
        "max" | "maximum" | "cap" | "ceiling" => RateType::Max,
        "conditionalfree" | "free" => RateType::ConditionalFree,
        _ => return Err(InvalidRate::UnknownType(name.to_owned())),
    };

    Ok(rate_type)
}

/// Prices are rounded to the nearest minor unit and never negative.
fn price(value: Option<&RawNumber>) -> std::result::Result<Money, InvalidRate> {
    let value = value.ok_or(InvalidRate::MissingPrice)?;
    let invalid = || InvalidRate::InvalidNumber {
        field: "price",
        value: value.to_string(),
    };

    let decimal = value
        .to_decimal()
        .ok_or_else(invalid)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .max(Decimal::ZERO);

    decimal.to_u64().map(Money::from_minor).ok_or_else(invalid)
}

fn unit_minutes(value: Option<&RawNumber>) -> std::result::Result<NonZeroU32, InvalidRate> {
    let minutes = whole_minutes("unitMinutes", value.ok_or(InvalidRate::MissingUnitMinutes)?)?;
    NonZeroU32::new(minutes).ok_or(InvalidRate::ZeroUnitMinutes)
}

fn whole_minutes(field: &'static str, value: &RawNumber) -> std::result::Result<u32, InvalidRate> {
    let invalid = || InvalidRate::InvalidNumber {
        field,
        value: value.to_string(),
    };

    let decimal = value.to_decimal().ok_or_else(invalid)?;

    if !decimal.fract().is_zero() {
        return Err(invalid());
    }

    decimal.to_u32().ok_or_else(invalid)
}

fn day_type(value: &RawDayType) -> std::result::Result<DayType, InvalidRate> {
    match value {
        RawDayType::One(name) => name.parse(),
        RawDayType::Many(names) => {
            let days = names
                .iter()
                .map(|name| name.parse())
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(DayType::Days(days))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use rust_decimal_macros::dec;

    use super::{normalize, normalize_rate};
    use crate::{
        raw::{RawDayType, RawNumber, RawRate},
        tariff::RateKind,
        types::{
            money::Money,
            time::{DayOfWeek, DayType},
        },
        Error, InvalidRate,
    };

    fn raw(rate_type: Option<&str>, unit: Option<RawNumber>, price: Option<RawNumber>) -> RawRate {
        RawRate {
            rate_type: rate_type.map(Into::into),
            unit_minutes: unit,
            price,
            ..RawRate::default()
        }
    }

    #[test]
    fn missing_type_defaults_to_base() {
        let rate = normalize_rate(&raw(None, Some(30.into()), Some(200.into()))).unwrap();

        assert_eq!(
            rate.kind,
            RateKind::Base {
                unit_minutes: NonZeroU32::new(30).unwrap(),
                price: Money::from_minor(200),
            }
        );
        assert!(rate.time_range.is_none() && rate.day_type.is_none());
    }

    #[test]
    fn missing_unit_on_base_is_an_error() {
        assert_eq!(
            normalize_rate(&raw(Some("base"), None, Some(200.into()))),
            Err(InvalidRate::MissingUnitMinutes)
        );
        assert_eq!(
            normalize_rate(&raw(Some("progressive"), None, Some(200.into()))),
            Err(InvalidRate::MissingUnitMinutes)
        );
    }

    #[test]
    fn missing_price_is_never_guessed() {
        assert_eq!(
            normalize_rate(&raw(Some("base"), Some(30.into()), None)),
            Err(InvalidRate::MissingPrice)
        );
    }

    #[test]
    fn negative_prices_clamp_to_zero_and_decimals_round() {
        let negative = normalize_rate(&raw(None, Some(30.into()), Some((-50).into()))).unwrap();
        assert_eq!(negative.price(), Money::from_minor(0));

        let half = normalize_rate(&raw(None, Some(30.into()), Some(dec!(199.5).into()))).unwrap();
        assert_eq!(half.price(), Money::from_minor(200));

        let text = normalize_rate(&raw(None, Some("30".into()), Some("¥1,000".into()))).unwrap();
        assert_eq!(text.price(), Money::from_minor(1000));
    }

    #[test]
    fn fractional_or_zero_units_are_rejected() {
        assert!(matches!(
            normalize_rate(&raw(None, Some(dec!(7.5).into()), Some(100.into()))),
            Err(InvalidRate::InvalidNumber { field: "unitMinutes", .. })
        ));
        assert_eq!(
            normalize_rate(&raw(None, Some(0.into()), Some(100.into()))),
            Err(InvalidRate::ZeroUnitMinutes)
        );
    }

    #[test]
    fn max_without_unit_is_unbounded() {
        let rate = normalize_rate(&raw(Some("Maximum"), None, Some(1500.into()))).unwrap();
        assert_eq!(
            rate.kind,
            RateKind::Max {
                window: None,
                price: Money::from_minor(1500),
            }
        );
    }

    #[test]
    fn progressive_requires_apply_after() {
        let mut rate = raw(Some("progressive"), Some(20.into()), Some(120.into()));
        assert_eq!(normalize_rate(&rate), Err(InvalidRate::MissingApplyAfter));

        rate.apply_after = Some(60.into());
        assert_eq!(
            normalize_rate(&rate).unwrap().kind,
            RateKind::Progressive {
                unit_minutes: NonZeroU32::new(20).unwrap(),
                price: Money::from_minor(120),
                apply_after: 60,
            }
        );
    }

    #[test]
    fn conditional_free_uses_unit_as_threshold() {
        let rate = normalize_rate(&raw(Some("conditional_free"), Some(15.into()), None)).unwrap();
        assert_eq!(
            rate.kind,
            RateKind::ConditionalFree {
                threshold_minutes: 15
            }
        );
    }

    #[test]
    fn restrictions_are_parsed() {
        let mut rate = raw(None, Some(60.into()), Some(100.into()));
        rate.time_range = Some("22:00~6:00".into());
        rate.day_type = Some(RawDayType::Many(vec!["Sat".into(), "sunday".into()]));

        let rate = normalize_rate(&rate).unwrap();
        assert_eq!(rate.time_range.map(|r| r.to_string()).as_deref(), Some("22:00~06:00"));
        assert_eq!(
            rate.day_type,
            Some(DayType::Days(vec![DayOfWeek::Saturday, DayOfWeek::Sunday]))
        );
    }

    #[test]
    fn table_errors_name_the_offending_entry() {
        let rates = [
            raw(None, Some(30.into()), Some(200.into())),
            raw(Some("surcharge"), Some(30.into()), Some(200.into())),
        ];

        assert_eq!(
            normalize(&rates).unwrap_err(),
            Error::InvalidTariff {
                index: 1,
                reason: InvalidRate::UnknownType("surcharge".into()),
            }
        );
    }
}
