// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::config::AppConfig;
use crate::error::BillingError;
use crate::utils::{BASE_CURRENCY, fx_convert, http_client, parse_date, parse_decimal, pretty_table};
use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

pub fn handle(conn: &Connection, cfg: &AppConfig, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("set", sub)) => {
            let date = parse_date(sub.get_one::<String>("date").unwrap())?;
            let quote = sub.get_one::<String>("quote").unwrap().trim().to_uppercase();
            let rate = parse_decimal(sub.get_one::<String>("rate").unwrap())?;
            if rate <= Decimal::ZERO {
                return Err(BillingError::validation("FX rate must be greater than zero").into());
            }
            set_rate(conn, &date.to_string(), &quote, rate)?;
            println!("1 {} = {} {} on {}", BASE_CURRENCY, rate, quote, date);
        }
        Some(("fetch", sub)) => {
            let days: usize = *sub.get_one::<usize>("days").unwrap_or(&30);
            let targets: Vec<String> = sub
                .get_one::<String>("to")
                .map(|s| s.as_str())
                .unwrap_or("EUR,GBP,INR")
                .split(',')
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty() && c != BASE_CURRENCY)
                .collect();
            fetch_rates(conn, &cfg.fx_url, days, &targets)?;
        }
        Some(("list", _)) => list_rates(conn)?,
        Some(("convert", sub)) => convert_amount(conn, sub)?,
        _ => {}
    }
    Ok(())
}

/// Upsert one `1 USD = rate quote` observation.
pub fn set_rate(conn: &Connection, date: &str, quote: &str, rate: Decimal) -> Result<()> {
    conn.execute(
        "INSERT INTO fx_rates(date, base, quote, rate) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(date, base, quote) DO UPDATE SET rate=excluded.rate",
        params![date, BASE_CURRENCY, quote, rate.to_string()],
    )?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct Series {
    pub rates: HashMap<String, HashMap<String, f64>>,
}

/// Store a Frankfurter time series; existing observations are kept.
pub fn store_series(conn: &Connection, s: &Series) -> Result<usize> {
    let mut n = 0;
    for (date, mp) in &s.rates {
        for (quote, rate) in mp {
            n += conn.execute(
                "INSERT OR IGNORE INTO fx_rates(date, base, quote, rate) VALUES (?1, ?2, ?3, ?4)",
                params![date, BASE_CURRENCY, quote, rate.to_string()],
            )?;
        }
    }
    Ok(n)
}

fn fetch_rates(conn: &Connection, base_url: &str, days: usize, targets: &[String]) -> Result<()> {
    if targets.is_empty() {
        println!("No quote currencies given; nothing to fetch.");
        return Ok(());
    }
    let today = Utc::now().date_naive();
    let start = today - chrono::Duration::days(days as i64);
    let to_param = targets.join(",");
    let url = format!(
        "{}/{start}..{today}?from={}&to={to_param}",
        base_url.trim_end_matches('/'),
        BASE_CURRENCY
    );
    let client = http_client()?;
    let resp = client.get(&url).send()?.error_for_status()?;
    let s: Series = resp.json()?;
    let n = store_series(conn, &s)?;
    info!(url = %url, stored = n, "fx rates fetched");
    println!("Stored {} FX rates via Frankfurter (ECB).", n);
    Ok(())
}

fn list_rates(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT date, base, quote, rate FROM fx_rates ORDER BY date DESC, base, quote LIMIT 50",
    )?;
    let rows = stmt.query_map([], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
        ))
    })?;
    let mut data = Vec::new();
    for row in rows {
        let (d, b, q, r) = row?;
        data.push(vec![d, b, q, r]);
    }
    println!("{}", pretty_table(&["Date", "Base", "Quote", "Rate"], data));
    Ok(())
}

fn convert_amount(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let date = parse_date(sub.get_one::<String>("date").unwrap())?;
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
    let from = sub.get_one::<String>("from").unwrap().to_uppercase();
    let to = sub.get_one::<String>("to").unwrap().to_uppercase();
    let res = fx_convert(conn, date, amount, &from, &to)?;
    println!("{} {} -> {:.4} {}", amount, from, res, to);
    Ok(())
}
