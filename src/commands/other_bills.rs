// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Manual client or agent charges. They never feed commission derivation.

use crate::db::decimal_at;
use crate::error::BillingError;
use crate::models::{OtherBill, OtherBillKind, Role};
use crate::registry::{get_group, get_user};
use crate::utils::{
    fmt_money, id_for_group, id_for_user, maybe_print_json, parse_date, parse_decimal,
    pretty_table,
};
use anyhow::Result;
use rusqlite::{Connection, params};
use rust_decimal::Decimal;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub),
        Some(("list", sub)) => list(conn, sub),
        Some(("rm", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            let n = conn.execute("DELETE FROM other_bill WHERE id=?1", params![id])?;
            if n == 0 {
                return Err(BillingError::not_found(format!("Entry {} not found", id)).into());
            }
            println!("Removed entry {}", id);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn add(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let raw_kind = sub.get_one::<String>("kind").unwrap();
    let kind = OtherBillKind::parse(raw_kind).ok_or_else(|| {
        BillingError::validation(format!("Unknown kind '{}' (use client|agent)", raw_kind))
    })?;
    let date = parse_date(sub.get_one::<String>("date").unwrap())?;
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
    if amount <= Decimal::ZERO {
        return Err(BillingError::validation("Amount must be greater than zero").into());
    }
    let note = sub.get_one::<String>("note").cloned();

    let (client_id, group_id, agent_id) = match kind {
        OtherBillKind::Client => {
            let client = sub
                .get_one::<String>("client")
                .ok_or_else(|| BillingError::validation("--client is required for kind=client"))?;
            let client_id = id_for_user(conn, client)?;
            if !get_user(conn, client_id)?.has_role(Role::Client) {
                return Err(BillingError::validation(format!("'{}' is not a client", client)).into());
            }
            let group = sub
                .get_one::<String>("group")
                .ok_or_else(|| BillingError::validation("--group is required for kind=client"))?;
            let group_id = id_for_group(conn, group)?;
            if get_group(conn, group_id)?.owner != client_id {
                return Err(BillingError::validation(format!(
                    "'{}' is not the owner of group '{}'",
                    client, group
                ))
                .into());
            }
            (Some(client_id), Some(group_id), None)
        }
        OtherBillKind::Agent => {
            let agent = sub
                .get_one::<String>("agent")
                .ok_or_else(|| BillingError::validation("--agent is required for kind=agent"))?;
            let agent_id = id_for_user(conn, agent)?;
            if !get_user(conn, agent_id)?.has_role(Role::Agent) {
                return Err(BillingError::validation(format!("'{}' is not an agent", agent)).into());
            }
            (None, None, Some(agent_id))
        }
    };

    conn.execute(
        "INSERT INTO other_bill(bill_date, kind, client_id, group_id, agent_id, amount, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            date.to_string(),
            kind.as_str(),
            client_id,
            group_id,
            agent_id,
            amount.to_string(),
            note
        ],
    )?;
    println!("Added {} entry {}", kind.as_str(), conn.last_insert_rowid());
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let kind = sub
        .get_one::<String>("kind")
        .map(|k| {
            OtherBillKind::parse(k)
                .ok_or_else(|| BillingError::validation(format!("Unknown kind '{}'", k)))
        })
        .transpose()?;
    let mut stmt = conn.prepare(
        "SELECT o.id, o.bill_date, o.kind, o.client_id, o.group_id, o.agent_id, o.amount,
                o.description, COALESCE(c.name, a.name, ''), COALESCE(g.name, '')
         FROM other_bill o
         LEFT JOIN users c ON c.id = o.client_id
         LEFT JOIN users a ON a.id = o.agent_id
         LEFT JOIN groups g ON g.id = o.group_id
         WHERE ?1 IS NULL OR o.kind = ?1
         ORDER BY o.bill_date DESC, o.id DESC",
    )?;
    let rows = stmt.query_map(params![kind.map(|k| k.as_str())], |r| {
        let kind: String = r.get(2)?;
        Ok((
            OtherBill {
                id: r.get(0)?,
                bill_date: r.get(1)?,
                kind: OtherBillKind::parse(&kind).unwrap_or(OtherBillKind::Client),
                client_id: r.get(3)?,
                group_id: r.get(4)?,
                agent_id: r.get(5)?,
                amount: decimal_at(r, 6)?,
                description: r.get(7)?,
            },
            r.get::<_, String>(8)?,
            r.get::<_, String>(9)?,
        ))
    })?;
    let mut entries = Vec::new();
    let mut data = Vec::new();
    for row in rows {
        let (ob, who, group) = row?;
        data.push(vec![
            ob.id.to_string(),
            ob.bill_date.to_string(),
            ob.kind.as_str().to_string(),
            who,
            group,
            fmt_money(&ob.amount),
            ob.description.clone().unwrap_or_default(),
        ]);
        entries.push(ob);
    }
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &entries)? {
        return Ok(());
    }
    println!(
        "{}",
        pretty_table(&["ID", "Date", "Kind", "Party", "Group", "Amount", "Note"], data)
    );
    Ok(())
}
