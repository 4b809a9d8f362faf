// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Bill write path and queries.
//!
//! Every create/update runs the agent-bill synchronizer inside the same
//! transaction, so a bill and its commission row commit or roll back together.
//! Deletion relies on `ON DELETE CASCADE` to drop the agent bill.

use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::agent_bill::sync_agent_bill;
use crate::db::{decimal_at, opt_decimal_at};
use crate::error::{BillingError, Result};
use crate::models::{Bill, GroupType, Role};
use crate::rates::resolve_bill_rate;
use crate::registry::{get_group, get_user};

#[derive(Debug, Clone)]
pub struct BillInput {
    pub bill_date: NaiveDate,
    pub group_id: i64,
    pub bank_id: Option<i64>,
    pub client_id: i64,
    pub agent_id: i64,
    pub amount: Decimal,
    /// Informational override; agent commission never reads it.
    pub rate: Option<Decimal>,
}

impl BillInput {
    fn validate(&self) -> Result<()> {
        let ids = [
            ("group_id", Some(self.group_id)),
            ("bank_id", self.bank_id),
            ("client_id", Some(self.client_id)),
            ("agent_id", Some(self.agent_id)),
        ];
        for (field, id) in ids {
            if let Some(v) = id {
                if v <= 0 {
                    return Err(BillingError::validation(format!(
                        "{} must be a positive integer",
                        field
                    )));
                }
            }
        }
        if self.amount <= Decimal::ZERO {
            return Err(BillingError::validation("Amount must be greater than zero"));
        }
        if let Some(r) = self.rate {
            if r < Decimal::ZERO {
                return Err(BillingError::validation("Rate must not be negative"));
            }
        }
        Ok(())
    }
}

/// The client is implied by the group; the agent must be an agent.
fn check_parties(conn: &Connection, input: &BillInput) -> Result<()> {
    let group = get_group(conn, input.group_id)
        .map_err(|_| BillingError::validation(format!("Group {} not found", input.group_id)))?;
    if group.owner != input.client_id {
        return Err(BillingError::validation(format!(
            "Client {} is not the owner of group '{}'",
            input.client_id, group.name
        )));
    }
    let agent = get_user(conn, input.agent_id)
        .map_err(|_| BillingError::validation(format!("Agent {} not found", input.agent_id)))?;
    if !agent.has_role(Role::Agent) {
        return Err(BillingError::validation(format!(
            "User '{}' is not an agent",
            agent.name
        )));
    }
    Ok(())
}

/// Plain insert with no synchronizer call; callers own the transaction.
pub(crate) fn insert_bill(conn: &Connection, input: &BillInput) -> Result<Bill> {
    conn.execute(
        "INSERT INTO bill(bill_date, group_id, bank_id, client_id, agent_id, amount, rate)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            input.bill_date.to_string(),
            input.group_id,
            input.bank_id,
            input.client_id,
            input.agent_id,
            input.amount.to_string(),
            input.rate.map(|r| r.to_string())
        ],
    )?;
    let id = conn.last_insert_rowid();
    Ok(Bill {
        id,
        bill_date: input.bill_date,
        group_id: input.group_id,
        bank_id: input.bank_id,
        client_id: input.client_id,
        agent_id: input.agent_id,
        amount: input.amount,
        rate: input.rate,
    })
}

pub fn create_bill(conn: &mut Connection, input: &BillInput) -> Result<Bill> {
    input.validate()?;
    let tx = conn.transaction()?;
    check_parties(&tx, input)?;
    let bill = insert_bill(&tx, input)?;
    sync_agent_bill(&tx, bill.id)?;
    tx.commit()?;

    info!(bill_id = bill.id, amount = %bill.amount, "bill created");
    Ok(bill)
}

pub fn update_bill(conn: &mut Connection, id: i64, input: &BillInput) -> Result<Bill> {
    input.validate()?;
    let tx = conn.transaction()?;
    check_parties(&tx, input)?;
    let n = tx.execute(
        "UPDATE bill SET bill_date=?1, group_id=?2, bank_id=?3, client_id=?4, agent_id=?5,
                amount=?6, rate=?7
         WHERE id=?8",
        params![
            input.bill_date.to_string(),
            input.group_id,
            input.bank_id,
            input.client_id,
            input.agent_id,
            input.amount.to_string(),
            input.rate.map(|r| r.to_string()),
            id
        ],
    )?;
    if n == 0 {
        return Err(BillingError::not_found(format!("Bill {} not found", id)));
    }
    sync_agent_bill(&tx, id)?;
    tx.commit()?;

    info!(bill_id = id, amount = %input.amount, "bill updated");
    get_bill(conn, id)
}

pub fn delete_bill(conn: &Connection, id: i64) -> Result<()> {
    let n = conn.execute("DELETE FROM bill WHERE id=?1", params![id])?;
    if n == 0 {
        return Err(BillingError::not_found(format!("Bill {} not found", id)));
    }
    info!(bill_id = id, "bill deleted");
    Ok(())
}

fn bill_from_row(r: &Row<'_>) -> rusqlite::Result<Bill> {
    Ok(Bill {
        id: r.get(0)?,
        bill_date: r.get(1)?,
        group_id: r.get(2)?,
        bank_id: r.get(3)?,
        client_id: r.get(4)?,
        agent_id: r.get(5)?,
        amount: decimal_at(r, 6)?,
        rate: opt_decimal_at(r, 7)?,
    })
}

pub fn get_bill(conn: &Connection, id: i64) -> Result<Bill> {
    conn.query_row(
        "SELECT id, bill_date, group_id, bank_id, client_id, agent_id, amount, rate
         FROM bill WHERE id=?1",
        params![id],
        bill_from_row,
    )
    .optional()?
    .ok_or_else(|| BillingError::not_found(format!("Bill {} not found", id)))
}

/// Client-facing rate: the bill's stored override, else the group policy.
pub fn client_rate(conn: &Connection, bill: &Bill) -> Result<Decimal> {
    if let Some(r) = bill.rate {
        return Ok(r);
    }
    let group = get_group(conn, bill.group_id)?;
    let mut lookup_err = None;
    let rate = resolve_bill_rate(group.id, group.same_rate, bill.bank_id, |bank_id| {
        crate::registry::group_bank_rate(conn, group.id, bank_id)
            .unwrap_or_else(|e| {
                lookup_err = Some(e);
                None
            })
    });
    if let Some(e) = lookup_err {
        return Err(e);
    }
    Ok(rate?)
}

#[derive(Debug, Clone, Default)]
pub struct BillFilter {
    pub group_type: Option<GroupType>,
    pub group_id: Option<i64>,
    pub agent_id: Option<i64>,
    pub client_id: Option<i64>,
    pub month: Option<String>,
    pub limit: Option<usize>,
}

/// A bill with display names and its client-facing total when resolvable.
#[derive(Debug, Clone, Serialize)]
pub struct BillRow {
    pub id: i64,
    pub bill_date: String,
    pub group: String,
    pub group_type: String,
    pub bank: String,
    pub client: String,
    pub agent: String,
    pub amount: Decimal,
    pub rate: Option<Decimal>,
    pub total: Option<Decimal>,
}

pub fn list_bills(conn: &Connection, f: &BillFilter) -> Result<Vec<BillRow>> {
    let mut sql = String::from(
        "SELECT b.id, b.bill_date, g.id, g.name, g.type, bk.bank_name, c.name, a.name,
                b.amount, b.rate, g.same_rate, gbr.rate, b.bank_id
         FROM bill b
         JOIN groups g ON g.id = b.group_id
         LEFT JOIN banks bk ON bk.id = b.bank_id
         LEFT JOIN users c ON c.id = b.client_id
         LEFT JOIN users a ON a.id = b.agent_id
         LEFT JOIN group_bank_rate gbr ON gbr.group_id = b.group_id AND gbr.bank_id = b.bank_id
         WHERE (?1 IS NULL OR lower(g.type) = lower(?1))
           AND (?2 IS NULL OR b.group_id = ?2)
           AND (?3 IS NULL OR b.agent_id = ?3)
           AND (?4 IS NULL OR b.client_id = ?4)
           AND (?5 IS NULL OR substr(b.bill_date, 1, 7) = ?5)
         ORDER BY b.bill_date DESC, b.id DESC",
    );
    if let Some(limit) = f.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            f.group_type.map(|t| t.as_str()),
            f.group_id,
            f.agent_id,
            f.client_id,
            f.month
        ],
        |r| {
            let group_id: i64 = r.get(2)?;
            let amount = decimal_at(r, 8)?;
            let stored_rate = opt_decimal_at(r, 9)?;
            let same_rate = opt_decimal_at(r, 10)?;
            let bank_rate = opt_decimal_at(r, 11)?;
            let bank_id: Option<i64> = r.get(12)?;
            let rate = stored_rate.or_else(|| {
                resolve_bill_rate(group_id, same_rate, bank_id, |_| bank_rate).ok()
            });
            Ok(BillRow {
                id: r.get(0)?,
                bill_date: r.get(1)?,
                group: r.get(3)?,
                group_type: r.get(4)?,
                bank: r.get::<_, Option<String>>(5)?.unwrap_or_else(|| "-".into()),
                client: r.get::<_, Option<String>>(6)?.unwrap_or_default(),
                agent: r.get::<_, Option<String>>(7)?.unwrap_or_default(),
                amount,
                rate,
                total: rate.and_then(|x| amount.checked_mul(x)),
            })
        },
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
