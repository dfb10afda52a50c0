use chrono::{Duration, NaiveDateTime, TimeZone, Utc};
use parking_fees::{
    compute_fee, normalize::normalize, pricer::Pricer, raw::RawTariff, Error, Fee, InvalidRate,
    Money, ParkingInterval,
};

mod common;

#[test_each::file(glob = "tests/resources/*.json")]
fn fee_json_files(content: &str) {
    common::validate_fee_test(content).unwrap();
}

#[test]
fn compute_fee_agrees_with_report() {
    let test = fee_test!("daily_cap_200_per_30_min");
    let table = normalize(test.tariff.rates()).unwrap();
    let pricer = Pricer::new(&table);

    for case in &test.cases {
        let fee = compute_fee(&table, case.start, case.end).unwrap();
        let interval = ParkingInterval::new(case.start, case.end).unwrap();

        assert_eq!(fee, pricer.build_report(&interval).unwrap().fee, "{}", case.name);
        assert_eq!(fee, compute_fee(&table, case.start, case.end).unwrap());
    }
}

#[test]
fn utc_stays_are_priced_on_the_local_clock() {
    let test = fee_test!("overnight_rate_with_night_cap");
    let table = normalize(test.tariff.rates()).unwrap();

    // 13:00Z is 22:00 in Tokyo.
    let start = Utc.with_ymd_and_hms(2024, 6, 3, 13, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 6, 3, 16, 0, 0).unwrap();
    let interval = ParkingInterval::from_utc(start, end, chrono_tz::Asia::Tokyo).unwrap();

    assert_eq!(
        Pricer::new(&table).fee(&interval).unwrap(),
        Fee::Amount(Money::from_minor(300))
    );
}

#[test]
fn stay_ending_before_it_starts_is_rejected() {
    let test = fee_test!("daily_cap_200_per_30_min");
    let table = normalize(test.tariff.rates()).unwrap();
    let case = &test.cases[0];

    assert_eq!(
        compute_fee(&table, case.end, case.start),
        Err(Error::InvalidInterval)
    );
}

#[test]
fn stay_past_the_last_representable_minute_overflows() {
    let test = fee_test!("daily_cap_200_per_30_min");
    let table = normalize(test.tariff.rates()).unwrap();
    let start = NaiveDateTime::MAX - Duration::minutes(10);

    assert_eq!(
        compute_fee(&table, start, NaiveDateTime::MAX),
        Err(Error::NumericOverflow)
    );
}

#[test]
fn rate_without_price_is_rejected() {
    let raw: RawTariff = serde_json::from_str(
        r#"[
            { "type": "base", "unitMinutes": 30, "price": 200 },
            { "type": "max", "unitMinutes": 1440 }
        ]"#,
    )
    .unwrap();

    assert_eq!(
        normalize(raw.rates()).unwrap_err(),
        Error::InvalidTariff {
            index: 1,
            reason: InvalidRate::MissingPrice,
        }
    );
}
