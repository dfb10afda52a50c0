//! Loosely typed tariff entries.
//!
//! Upstream tariff stores are not consistent about field names or types: prices arrive as
//! numbers or strings, day types as a single string or a list. These structures accept all of
//! those shapes and leave validation to [`crate::normalize`].

use std::fmt;

use rust_decimal::{prelude::FromPrimitive, Decimal};
use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer,
};

/// A tariff as stored upstream: either a bare list of rates or an object holding them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTariff {
    Rates(Vec<RawRate>),
    Table {
        /// Identifier of the parking spot this tariff belongs to.
        #[serde(default, alias = "spot_id", alias = "spotId")]
        id: Option<String>,
        #[serde(alias = "tariffs", alias = "fees")]
        rates: Vec<RawRate>,
    },
}

impl RawTariff {
    #[must_use]
    pub fn rates(&self) -> &[RawRate] {
        match self {
            Self::Rates(rates) | Self::Table { rates, .. } => rates,
        }
    }
}

/// A single tariff entry before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRate {
    /// Kind of rate, `base` when absent.
    #[serde(default, rename = "type", alias = "kind", alias = "rateType", alias = "rate_type")]
    pub rate_type: Option<String>,

    /// Billing unit for per-unit rates, window for caps, threshold for free rates.
    #[serde(default, alias = "unit_minutes", alias = "unit", alias = "minutes")]
    pub unit_minutes: Option<RawNumber>,

    /// Price in the minor currency unit.
    #[serde(default, alias = "amount", alias = "fee")]
    pub price: Option<RawNumber>,

    /// Clock time window, for example `22:00~06:00`.
    #[serde(default, alias = "time_range")]
    pub time_range: Option<String>,

    /// Which days this rate applies on.
    #[serde(default, alias = "day_type")]
    pub day_type: Option<RawDayType>,

    /// Minutes after which a progressive rate starts applying.
    #[serde(default, alias = "apply_after")]
    pub apply_after: Option<RawNumber>,
}

/// A day type as a single name (`"weekday"`, `"sat,sun"`) or a list of day names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawDayType {
    One(String),
    Many(Vec<String>),
}

/// A number that may have been stored as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawNumber {
    Decimal(Decimal),
    Text(String),
}

impl RawNumber {
    /// Interpret this value as a decimal, accepting yen signs and thousands separators.
    pub(crate) fn to_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(decimal) => Some(*decimal),
            Self::Text(text) => {
                let cleaned: String = text
                    .trim()
                    .trim_start_matches(['¥', '￥'])
                    .trim_end_matches('円')
                    .chars()
                    .filter(|&c| c != ',')
                    .collect();

                cleaned.trim().parse().ok()
            }
        }
    }
}

impl fmt::Display for RawNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decimal(decimal) => decimal.fmt(f),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<Decimal> for RawNumber {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<i64> for RawNumber {
    fn from(value: i64) -> Self {
        Self::Decimal(value.into())
    }
}

impl From<&str> for RawNumber {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl<'de> Deserialize<'de> for RawNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RawNumberVisitor;

        impl Visitor<'_> for RawNumberVisitor {
            type Value = RawNumber;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number or a numeric string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(RawNumber::Decimal(v.into()))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(RawNumber::Decimal(v.into()))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Decimal::from_f64(v)
                    .map(RawNumber::Decimal)
                    .ok_or_else(|| E::custom("overflow"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(RawNumber::Text(v.to_owned()))
            }
        }

        deserializer.deserialize_any(RawNumberVisitor)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::{RawDayType, RawNumber, RawRate, RawTariff};

    #[test]
    fn accepts_mixed_field_names_and_types() {
        let json = r#"[
            { "type": "base", "unitMinutes": 30, "price": 200 },
            { "type": "max", "unit_minutes": "1440", "price": "2,000", "day_type": "weekday" },
            { "unit": 20, "price": 120.5, "timeRange": "22:00~6:00", "dayType": ["sat", "sun"] }
        ]"#;

        let tariff: RawTariff = serde_json::from_str(json).unwrap();
        let rates = tariff.rates();

        assert_eq!(rates.len(), 3);
        assert_eq!(rates[0].rate_type.as_deref(), Some("base"));
        assert_eq!(rates[1].unit_minutes, Some(RawNumber::Text("1440".into())));
        assert_eq!(rates[1].price.as_ref().and_then(RawNumber::to_decimal), Some(dec!(2000)));
        assert_eq!(rates[2].rate_type, None);
        assert_eq!(rates[2].price.as_ref().and_then(RawNumber::to_decimal), Some(dec!(120.5)));
        assert_eq!(
            rates[2].day_type,
            Some(RawDayType::Many(vec!["sat".into(), "sun".into()]))
        );
    }

    #[test]
    fn accepts_object_with_spot_id() {
        let json = r#"{ "spotId": "P-101", "rates": [{ "unitMinutes": 60, "price": null }] }"#;
        let tariff: RawTariff = serde_json::from_str(json).unwrap();

        let RawTariff::Table { id, rates } = &tariff else {
            panic!("expected a table");
        };

        assert_eq!(id.as_deref(), Some("P-101"));
        assert_eq!(rates[0].price, None);
    }

    #[test]
    fn yen_prices_are_read_as_numbers() {
        assert_eq!(RawNumber::from("¥1,200").to_decimal(), Some(dec!(1200)));
        assert_eq!(RawNumber::from("300円").to_decimal(), Some(dec!(300)));
        assert_eq!(RawNumber::from("free").to_decimal(), None);
    }

    #[test]
    fn missing_fields_default_to_none() {
        let rate: RawRate = serde_json::from_str("{}").unwrap();
        assert!(rate.rate_type.is_none() && rate.unit_minutes.is_none() && rate.price.is_none());
    }
}
