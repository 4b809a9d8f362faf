// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::agent_bill::{AgentBillFilter, list_agent_bills};
use crate::bill::{BillFilter, list_bills};
use crate::error::BillingError;
use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("bills", sub)) => export_bills(conn, sub),
        Some(("agent-bills", sub)) => export_agent_bills(conn, sub),
        _ => Ok(()),
    }
}

fn write_out<T: Serialize>(
    fmt: &str,
    out: &str,
    header: &[&str],
    items: &[T],
    record: impl Fn(&T) -> Vec<String>,
) -> Result<()> {
    match fmt {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record(header)?;
            for item in items {
                wtr.write_record(record(item))?;
            }
            wtr.flush()?;
        }
        "json" => {
            std::fs::write(out, serde_json::to_string_pretty(items)?)?;
        }
        _ => {
            return Err(
                BillingError::validation(format!("Unknown format: {} (use csv|json)", fmt)).into(),
            );
        }
    }
    Ok(())
}

fn export_bills(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let fmt = sub.get_one::<String>("format").unwrap().to_lowercase();
    let out = sub.get_one::<String>("out").unwrap();
    let rows = list_bills(conn, &BillFilter::default())?;
    write_out(
        &fmt,
        out,
        &[
            "id", "date", "group", "type", "bank", "client", "agent", "amount", "rate", "total",
        ],
        &rows,
        |r| {
            vec![
                r.id.to_string(),
                r.bill_date.clone(),
                r.group.clone(),
                r.group_type.clone(),
                r.bank.clone(),
                r.client.clone(),
                r.agent.clone(),
                r.amount.to_string(),
                r.rate.map(|x| x.to_string()).unwrap_or_default(),
                r.total.map(|x| x.to_string()).unwrap_or_default(),
            ]
        },
    )?;
    println!("Exported {} bills to {}", rows.len(), out);
    Ok(())
}

fn export_agent_bills(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let fmt = sub.get_one::<String>("format").unwrap().to_lowercase();
    let out = sub.get_one::<String>("out").unwrap();
    let rows = list_agent_bills(conn, &AgentBillFilter::default())?;
    write_out(
        &fmt,
        out,
        &[
            "bill_id", "date", "agent", "client", "group", "bank", "source", "amount", "rate",
            "total",
        ],
        &rows,
        |r| {
            vec![
                r.bill_id.to_string(),
                r.bill_date.clone(),
                r.agent.clone(),
                r.client.clone(),
                r.group.clone(),
                r.bank.clone(),
                r.source.clone(),
                r.amount.to_string(),
                r.rate.to_string(),
                r.total.to_string(),
            ]
        },
    )?;
    println!("Exported {} agent bills to {}", rows.len(), out);
    Ok(())
}
