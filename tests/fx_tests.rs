// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use billdesk::commands::fx::{Series, set_rate, store_series};
use billdesk::db;
use billdesk::utils::fx_convert;
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;

fn setup() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    conn
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
}

#[test]
fn fx_triangulation_and_reciprocal() {
    let conn = setup();
    set_rate(&conn, "2026-03-01", "INR", "83".parse().unwrap()).unwrap();
    set_rate(&conn, "2026-03-01", "EUR", "0.90".parse().unwrap()).unwrap();

    // 90 EUR -> 100 USD -> 8300 INR
    let res = fx_convert(&conn, day(15), Decimal::new(9000, 2), "EUR", "INR").unwrap();
    assert_eq!(format!("{:.2}", res.round_dp(2)), "8300.00");

    // 166 INR / 83 = 2 USD
    let res2 = fx_convert(&conn, day(15), Decimal::new(16600, 2), "INR", "USD").unwrap();
    assert_eq!(format!("{:.2}", res2.round_dp(2)), "2.00");
}

#[test]
fn set_rate_replaces_same_day_value() {
    let conn = setup();
    set_rate(&conn, "2026-03-01", "EUR", "0.90".parse().unwrap()).unwrap();
    set_rate(&conn, "2026-03-01", "EUR", "0.50".parse().unwrap()).unwrap();
    let res = fx_convert(&conn, day(2), Decimal::from(10), "USD", "EUR").unwrap();
    assert_eq!(res, Decimal::from(5));
}

#[test]
fn uses_latest_rate_on_or_before_date() {
    let conn = setup();
    set_rate(&conn, "2026-03-01", "EUR", "0.90".parse().unwrap()).unwrap();
    set_rate(&conn, "2026-03-10", "EUR", "0.80".parse().unwrap()).unwrap();
    let early = fx_convert(&conn, day(5), Decimal::from(100), "USD", "EUR").unwrap();
    let late = fx_convert(&conn, day(12), Decimal::from(100), "USD", "EUR").unwrap();
    assert_eq!(early, Decimal::from(90));
    assert_eq!(late, Decimal::from(80));
}

#[test]
fn fetched_series_does_not_overwrite_manual_rates() {
    let conn = setup();
    set_rate(&conn, "2026-03-02", "EUR", "0.95".parse().unwrap()).unwrap();
    let series: Series = serde_json::from_str(
        r#"{"amount":1.0,"base":"USD","start_date":"2026-03-02","end_date":"2026-03-03",
            "rates":{"2026-03-02":{"EUR":0.91,"GBP":0.79},"2026-03-03":{"EUR":0.92}}}"#,
    )
    .unwrap();
    assert_eq!(store_series(&conn, &series).unwrap(), 2);
    let res = fx_convert(&conn, day(2), Decimal::from(100), "USD", "EUR").unwrap();
    assert_eq!(res, Decimal::from(95));
}
