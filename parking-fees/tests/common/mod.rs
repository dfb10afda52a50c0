use chrono::{NaiveDate, NaiveDateTime};
use parking_fees::{
    normalize::normalize, pricer::Pricer, raw::RawTariff, Fee, Money, ParkingInterval,
};
use serde::Deserialize;

/// A tariff and the fees expected for a set of stays under it.
#[derive(Deserialize)]
pub struct FeeTest {
    pub tariff: RawTariff,
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
    pub cases: Vec<FeeCase>,
}

#[derive(Deserialize)]
pub struct FeeCase {
    pub name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Expected fee in minor units, `null` when the fee is undetermined.
    pub fee: Option<u64>,
}

#[macro_export]
macro_rules! fee_test {
    ($name:literal) => {
        serde_json::from_str::<'_, common::FeeTest>(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/resources/",
            $name,
            ".json"
        )))
        .unwrap()
    };
}

pub fn validate_fee_test(content: &str) -> Result<(), parking_fees::Error> {
    let test: FeeTest = serde_json::from_str(content).expect("fixture should be valid JSON");
    let table = normalize(test.tariff.rates())?;
    let pricer = Pricer::new(&table).with_holidays(test.holidays.iter().copied());

    for case in &test.cases {
        let interval = ParkingInterval::new(case.start, case.end)?;
        let report = pricer.build_report(&interval)?;

        let expected = case
            .fee
            .map_or(Fee::Undetermined, |fee| Fee::Amount(Money::from_minor(fee)));

        assert_eq!(report.fee, expected, "case `{}`", case.name);
    }

    Ok(())
}
