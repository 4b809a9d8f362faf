// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::agent_bill::{AgentBillFilter, list_agent_bills};
use crate::bill::{BillFilter, list_bills};
use crate::db::decimal_at;
use crate::utils::{fmt_money, maybe_print_json, parse_month, pretty_table};
use anyhow::Result;
use rusqlite::{Connection, params};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("agents", sub)) => agents(conn, sub)?,
        Some(("clients", sub)) => clients(conn, sub)?,
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub agent: String,
    pub bills: usize,
    pub claim_commission: Decimal,
    pub depo_commission: Decimal,
    pub other: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSummary {
    pub client: String,
    pub bills: usize,
    pub amount: Decimal,
    pub billed: Decimal,
    pub unresolved: usize,
    pub other: Decimal,
}

fn other_by_party(
    conn: &Connection,
    kind: &str,
    month: Option<&str>,
) -> Result<BTreeMap<String, Decimal>> {
    let mut stmt = conn.prepare(
        "SELECT u.name, o.amount
         FROM other_bill o
         JOIN users u ON u.id = CASE o.kind WHEN 'agent' THEN o.agent_id ELSE o.client_id END
         WHERE o.kind = ?1 AND (?2 IS NULL OR substr(o.bill_date, 1, 7) = ?2)",
    )?;
    let rows = stmt.query_map(params![kind, month], |r| {
        Ok((r.get::<_, String>(0)?, decimal_at(r, 1)?))
    })?;
    let mut out = BTreeMap::new();
    for row in rows {
        let (name, amt) = row?;
        *out.entry(name).or_insert(Decimal::ZERO) += amt;
    }
    Ok(out)
}

/// Commission per agent, split by source, plus manual agent entries.
pub fn agent_summary(conn: &Connection, month: Option<&str>) -> Result<Vec<AgentSummary>> {
    let rows = list_agent_bills(
        conn,
        &AgentBillFilter {
            month: month.map(str::to_string),
            ..Default::default()
        },
    )?;
    let mut map: BTreeMap<String, AgentSummary> = BTreeMap::new();
    for r in rows {
        let e = map.entry(r.agent.clone()).or_insert_with(|| AgentSummary {
            agent: r.agent.clone(),
            ..Default::default()
        });
        e.bills += 1;
        if r.source == "Claim" {
            e.claim_commission += r.total;
        } else {
            e.depo_commission += r.total;
        }
    }
    for (name, amt) in other_by_party(conn, "agent", month)? {
        let e = map.entry(name.clone()).or_insert_with(|| AgentSummary {
            agent: name,
            ..Default::default()
        });
        e.other += amt;
    }
    Ok(map
        .into_values()
        .map(|mut s| {
            s.total = s.claim_commission + s.depo_commission + s.other;
            s
        })
        .collect())
}

/// Billed totals per client; bills whose rate cannot be resolved are counted
/// separately instead of contributing zero.
pub fn client_summary(conn: &Connection, month: Option<&str>) -> Result<Vec<ClientSummary>> {
    let rows = list_bills(
        conn,
        &BillFilter {
            month: month.map(str::to_string),
            ..Default::default()
        },
    )?;
    let mut map: BTreeMap<String, ClientSummary> = BTreeMap::new();
    for r in rows {
        let e = map.entry(r.client.clone()).or_insert_with(|| ClientSummary {
            client: r.client.clone(),
            ..Default::default()
        });
        e.bills += 1;
        e.amount += r.amount;
        match r.total {
            Some(t) => e.billed += t,
            None => e.unresolved += 1,
        }
    }
    for (name, amt) in other_by_party(conn, "client", month)? {
        let e = map.entry(name.clone()).or_insert_with(|| ClientSummary {
            client: name,
            ..Default::default()
        });
        e.other += amt;
    }
    Ok(map.into_values().collect())
}

fn month_arg(sub: &clap::ArgMatches) -> Result<Option<String>> {
    sub.get_one::<String>("month")
        .map(|s| parse_month(s))
        .transpose()
}

fn agents(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let month = month_arg(sub)?;
    let items = agent_summary(conn, month.as_deref())?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &items)? {
        return Ok(());
    }
    let data = items
        .iter()
        .map(|s| {
            vec![
                s.agent.clone(),
                s.bills.to_string(),
                fmt_money(&s.claim_commission),
                fmt_money(&s.depo_commission),
                fmt_money(&s.other),
                fmt_money(&s.total),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Agent", "Bills", "Claim", "Depo", "Other", "Total"], data)
    );
    Ok(())
}

fn clients(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let month = month_arg(sub)?;
    let items = client_summary(conn, month.as_deref())?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &items)? {
        return Ok(());
    }
    let data = items
        .iter()
        .map(|s| {
            vec![
                s.client.clone(),
                s.bills.to_string(),
                fmt_money(&s.amount),
                fmt_money(&s.billed),
                s.unresolved.to_string(),
                fmt_money(&s.other),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["Client", "Bills", "Amount", "Billed", "Unresolved", "Other"],
            data
        )
    );
    Ok(())
}
