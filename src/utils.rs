// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;

use crate::error::BillingError;

/// Bills are denominated in this currency; FX rates are stored from it.
pub const BASE_CURRENCY: &str = "USD";

const UA: &str = concat!("billdesk/", env!("CARGO_PKG_VERSION"));

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 \-]{5,18}[0-9]$").expect("static regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"));

pub fn http_client() -> Result<reqwest::blocking::Client> {
    let c = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .user_agent(UA)
        .build()?;
    Ok(c)
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

pub fn parse_month(s: &str) -> Result<String> {
    NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d")
        .with_context(|| format!("Invalid month '{}', expected YYYY-MM", s))?;
    Ok(s.to_string())
}

pub fn parse_decimal(s: &str) -> Result<Decimal> {
    s.trim()
        .parse::<Decimal>()
        .with_context(|| format!("Invalid decimal '{}'", s))
}

pub fn parse_id(s: &str) -> Result<i64> {
    s.trim()
        .parse::<i64>()
        .with_context(|| format!("Invalid id '{}'", s))
}

pub fn fmt_money(d: &Decimal) -> String {
    format!("{:.2}", d.round_dp(2))
}

/// Lowercased, trimmed, inner whitespace collapsed. Used for name matching.
pub fn normalize_key(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn is_valid_phone(s: &str) -> bool {
    if !PHONE_RE.is_match(s) {
        return false;
    }
    let digits = s.chars().filter(|c| c.is_ascii_digit()).count();
    (7..=15).contains(&digits)
}

pub fn is_valid_email(s: &str) -> bool {
    EMAIL_RE.is_match(s)
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(
    json_flag: bool,
    jsonl_flag: bool,
    v: &T,
) -> Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    if jsonl_flag {
        let val = serde_json::to_value(v)?;
        if let Some(arr) = val.as_array() {
            for item in arr {
                println!("{}", serde_json::to_string(item)?);
            }
        } else {
            println!("{}", serde_json::to_string(&val)?);
        }
        return Ok(true);
    }
    Ok(false)
}

pub fn id_for_bank(conn: &Connection, name: &str) -> Result<i64> {
    let mut stmt = conn.prepare("SELECT id FROM banks WHERE bank_name=?1 COLLATE NOCASE")?;
    let id: i64 = stmt
        .query_row(params![name.trim()], |r| r.get(0))
        .with_context(|| format!("Bank '{}' not found", name))?;
    Ok(id)
}

pub fn id_for_group(conn: &Connection, name: &str) -> Result<i64> {
    let mut stmt = conn.prepare("SELECT id FROM groups WHERE name=?1 COLLATE NOCASE")?;
    let id: i64 = stmt
        .query_row(params![name.trim()], |r| r.get(0))
        .with_context(|| format!("Group '{}' not found", name))?;
    Ok(id)
}

/// Users are addressed by numeric id or by email.
pub fn id_for_user(conn: &Connection, key: &str) -> Result<i64> {
    let key = key.trim();
    if let Ok(id) = key.parse::<i64>() {
        let found: Option<i64> = conn
            .query_row("SELECT id FROM users WHERE id=?1", params![id], |r| r.get(0))
            .optional()?;
        return found.with_context(|| format!("User {} not found", id));
    }
    let mut stmt = conn.prepare("SELECT id FROM users WHERE email=?1 COLLATE NOCASE")?;
    let id: i64 = stmt
        .query_row(params![key], |r| r.get(0))
        .with_context(|| format!("User '{}' not found", key))?;
    Ok(id)
}

fn find_rate(conn: &Connection, date: NaiveDate, base: &str, quote: &str) -> Result<Option<Decimal>> {
    let mut stmt = conn.prepare(
        "SELECT rate FROM fx_rates WHERE base=?1 AND quote=?2 AND date<=?3 ORDER BY date DESC LIMIT 1",
    )?;
    let r: Option<String> = stmt
        .query_row(params![base, quote, date.to_string()], |r| r.get(0))
        .optional()?;
    match r {
        Some(s) => {
            let d = s
                .parse::<Decimal>()
                .with_context(|| format!("Invalid rate '{}' for {}/{}", s, base, quote))?;
            Ok(Some(d))
        }
        None => Ok(None),
    }
}

/// Convert using the closest on-or-before rate, routing through the base
/// currency. Amounts pass through unchanged when no rate is known.
fn fx_result(v: Option<Decimal>, amount: Decimal, from_ccy: &str, to_ccy: &str) -> Result<Decimal> {
    v.ok_or_else(|| {
        BillingError::validation(format!(
            "{} {} is out of range in {}",
            amount, from_ccy, to_ccy
        ))
        .into()
    })
}

pub fn fx_convert(
    conn: &Connection,
    date: NaiveDate,
    amount: Decimal,
    from_ccy: &str,
    to_ccy: &str,
) -> Result<Decimal> {
    if from_ccy == to_ccy {
        return Ok(amount);
    }
    let hub = BASE_CURRENCY;

    if to_ccy == hub {
        if let Some(r) = find_rate(conn, date, hub, from_ccy)? {
            if r.is_zero() {
                return Ok(amount);
            }
            return fx_result(amount.checked_div(r), amount, from_ccy, to_ccy);
        }
    } else if from_ccy == hub {
        if let Some(r) = find_rate(conn, date, hub, to_ccy)? {
            return fx_result(amount.checked_mul(r), amount, from_ccy, to_ccy);
        }
    } else {
        let base_amt = fx_convert(conn, date, amount, from_ccy, hub)?;
        return fx_convert(conn, date, base_amt, hub, to_ccy);
    }

    if let Some(r) = find_rate(conn, date, to_ccy, from_ccy)? {
        if r.is_zero() {
            return Ok(amount);
        }
        return fx_result(amount.checked_div(r), amount, from_ccy, to_ccy);
    }

    Ok(amount)
}
