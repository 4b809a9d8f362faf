// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Derived agent commission rows.
//!
//! Each bill has at most one `agent_bill` row. [`sync_agent_bill`] recomputes
//! it from the bill, its group and its agent, and must run on the same
//! connection (transaction) as the bill write that triggers it.

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::db::decimal_at;
use crate::error::{BillingError, Result};
use crate::models::{AgentBill, Source};
use crate::rates::{Rate, resolve_agent_rate};

struct BillSnapshot {
    bill_date: NaiveDate,
    group_id: i64,
    bank_id: Option<i64>,
    client_id: i64,
    agent_id: i64,
    amount: Decimal,
    group_type: String,
    generic_rate: Option<Rate>,
    agent_rates: Option<Rate>,
}

fn load_snapshot(conn: &Connection, bill_id: i64) -> Result<Option<BillSnapshot>> {
    let snap = conn
        .query_row(
            "SELECT b.bill_date, b.group_id, b.bank_id, b.client_id, b.agent_id, b.amount,
                    g.type, u.rate, u.agent_rates
             FROM bill b
             JOIN groups g ON g.id = b.group_id
             LEFT JOIN users u ON u.id = b.agent_id
             WHERE b.id = ?1",
            params![bill_id],
            |r| {
                let rate: Option<String> = r.get(7)?;
                let agent_rates: Option<String> = r.get(8)?;
                Ok(BillSnapshot {
                    bill_date: r.get(0)?,
                    group_id: r.get(1)?,
                    bank_id: r.get(2)?,
                    client_id: r.get(3)?,
                    agent_id: r.get(4)?,
                    amount: decimal_at(r, 5)?,
                    group_type: r.get(6)?,
                    generic_rate: Rate::from_db(rate.as_deref()),
                    agent_rates: Rate::from_db(agent_rates.as_deref()),
                })
            },
        )
        .optional()?;
    Ok(snap)
}

/// Re-derive the agent bill for `bill_id`.
///
/// Returns `None` when the bill does not exist or its group is not
/// commissionable (any stale row is removed). Safe to call repeatedly.
pub fn sync_agent_bill(conn: &Connection, bill_id: i64) -> Result<Option<AgentBill>> {
    let Some(snap) = load_snapshot(conn, bill_id)? else {
        debug!(bill_id, "bill not found, nothing to sync");
        return Ok(None);
    };

    let Some(source) = Source::from_group_type(&snap.group_type) else {
        let removed = delete_agent_bill(conn, bill_id)?;
        debug!(bill_id, group_type = %snap.group_type, removed, "group not commissionable");
        return Ok(None);
    };

    let rate = resolve_agent_rate(source, snap.agent_rates.as_ref(), snap.generic_rate.as_ref());
    if rate.is_zero() {
        warn!(bill_id, agent_id = snap.agent_id, %source, "agent rate unresolved, commission is zero");
    }
    let total = snap.amount.checked_mul(rate).ok_or_else(|| {
        BillingError::validation(format!(
            "Commission for bill {} is out of range: {} x {}",
            bill_id, snap.amount, rate
        ))
    })?;
    let agent_bill = AgentBill {
        bill_id,
        bill_date: snap.bill_date,
        group_id: snap.group_id,
        client_id: snap.client_id,
        agent_id: snap.agent_id,
        source,
        bank_id: snap.bank_id,
        amount: snap.amount,
        rate,
        total,
    };
    upsert_agent_bill(conn, &agent_bill)?;
    debug!(bill_id, %rate, total = %agent_bill.total, "agent bill synced");
    Ok(Some(agent_bill))
}

/// Insert or replace the row keyed by `bill_id`.
pub fn upsert_agent_bill(conn: &Connection, ab: &AgentBill) -> Result<()> {
    conn.execute(
        "INSERT INTO agent_bill(bill_id, bill_date, group_id, client_id, agent_id, source, bank_id, amount, rate, total)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(bill_id) DO UPDATE SET
            bill_date=excluded.bill_date,
            group_id=excluded.group_id,
            client_id=excluded.client_id,
            agent_id=excluded.agent_id,
            source=excluded.source,
            bank_id=excluded.bank_id,
            amount=excluded.amount,
            rate=excluded.rate,
            total=excluded.total",
        params![
            ab.bill_id,
            ab.bill_date.to_string(),
            ab.group_id,
            ab.client_id,
            ab.agent_id,
            ab.source.as_str(),
            ab.bank_id,
            ab.amount.to_string(),
            ab.rate.to_string(),
            ab.total.to_string()
        ],
    )?;
    Ok(())
}

/// Returns whether a row was removed.
pub fn delete_agent_bill(conn: &Connection, bill_id: i64) -> Result<bool> {
    let n = conn.execute("DELETE FROM agent_bill WHERE bill_id=?1", params![bill_id])?;
    Ok(n > 0)
}

pub fn get_agent_bill(conn: &Connection, bill_id: i64) -> Result<Option<AgentBill>> {
    let ab = conn
        .query_row(
            "SELECT bill_id, bill_date, group_id, client_id, agent_id, source, bank_id, amount, rate, total
             FROM agent_bill WHERE bill_id=?1",
            params![bill_id],
            |r| {
                let source: String = r.get(5)?;
                let source = Source::from_group_type(&source).ok_or_else(|| {
                    rusqlite::Error::InvalidColumnType(5, "source".into(), Type::Text)
                })?;
                Ok(AgentBill {
                    bill_id: r.get(0)?,
                    bill_date: r.get(1)?,
                    group_id: r.get(2)?,
                    client_id: r.get(3)?,
                    agent_id: r.get(4)?,
                    source,
                    bank_id: r.get(6)?,
                    amount: decimal_at(r, 7)?,
                    rate: decimal_at(r, 8)?,
                    total: decimal_at(r, 9)?,
                })
            },
        )
        .optional()?;
    Ok(ab)
}

#[derive(Debug, Clone, Default)]
pub struct AgentBillFilter {
    pub agent_id: Option<i64>,
    pub client_id: Option<i64>,
    pub source: Option<Source>,
    pub month: Option<String>,
}

/// Agent bill joined with display names.
#[derive(Debug, Clone, Serialize)]
pub struct AgentBillRow {
    pub bill_id: i64,
    pub bill_date: String,
    pub agent: String,
    pub client: String,
    pub group: String,
    pub bank: String,
    pub source: String,
    pub amount: Decimal,
    pub rate: Decimal,
    pub total: Decimal,
}

pub fn list_agent_bills(conn: &Connection, f: &AgentBillFilter) -> Result<Vec<AgentBillRow>> {
    let mut stmt = conn.prepare(
        "SELECT ab.bill_id, ab.bill_date, a.name, c.name, g.name, bk.bank_name, ab.source,
                ab.amount, ab.rate, ab.total
         FROM agent_bill ab
         LEFT JOIN users a ON a.id = ab.agent_id
         LEFT JOIN users c ON c.id = ab.client_id
         LEFT JOIN groups g ON g.id = ab.group_id
         LEFT JOIN banks bk ON bk.id = ab.bank_id
         WHERE (?1 IS NULL OR ab.agent_id = ?1)
           AND (?2 IS NULL OR ab.client_id = ?2)
           AND (?3 IS NULL OR ab.source = ?3)
           AND (?4 IS NULL OR substr(ab.bill_date, 1, 7) = ?4)
         ORDER BY ab.bill_date DESC, ab.bill_id DESC",
    )?;
    let rows = stmt.query_map(
        params![
            f.agent_id,
            f.client_id,
            f.source.map(|s| s.as_str()),
            f.month
        ],
        |r| {
            Ok(AgentBillRow {
                bill_id: r.get(0)?,
                bill_date: r.get(1)?,
                agent: r.get::<_, Option<String>>(2)?.unwrap_or_default(),
                client: r.get::<_, Option<String>>(3)?.unwrap_or_default(),
                group: r.get::<_, Option<String>>(4)?.unwrap_or_default(),
                bank: r.get::<_, Option<String>>(5)?.unwrap_or_else(|| "-".into()),
                source: r.get(6)?,
                amount: decimal_at(r, 7)?,
                rate: decimal_at(r, 8)?,
                total: decimal_at(r, 9)?,
            })
        },
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
