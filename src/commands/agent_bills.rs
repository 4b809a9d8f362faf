// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::agent_bill::{AgentBillFilter, list_agent_bills};
use crate::error::BillingError;
use crate::models::Source;
use crate::utils::{
    BASE_CURRENCY, fmt_money, fx_convert, id_for_user, maybe_print_json, parse_date, parse_month,
    pretty_table,
};
use anyhow::Result;
use rust_decimal::Decimal;
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("list", sub)) => list(conn, sub),
        _ => Ok(()),
    }
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let source = sub
        .get_one::<String>("source")
        .map(|s| {
            Source::from_group_type(s)
                .ok_or_else(|| BillingError::validation(format!("Unknown source '{}' (use Claim|Depo)", s)))
        })
        .transpose()?;
    let filter = AgentBillFilter {
        agent_id: sub
            .get_one::<String>("agent")
            .map(|a| id_for_user(conn, a))
            .transpose()?,
        client_id: sub
            .get_one::<String>("client")
            .map(|c| id_for_user(conn, c))
            .transpose()?,
        source,
        month: sub
            .get_one::<String>("month")
            .map(|s| parse_month(s))
            .transpose()?,
    };
    let currency = sub
        .get_one::<String>("currency")
        .map(|c| c.to_uppercase())
        .unwrap_or_else(|| BASE_CURRENCY.to_string());

    let rows = list_agent_bills(conn, &filter)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &rows)? {
        return Ok(());
    }
    let mut grand = Decimal::ZERO;
    let mut data = Vec::new();
    for r in rows {
        let date = parse_date(&r.bill_date)?;
        let total = fx_convert(conn, date, r.total, BASE_CURRENCY, &currency)?;
        grand += total;
        data.push(vec![
            r.bill_id.to_string(),
            r.bill_date,
            r.agent,
            r.client,
            r.group,
            r.bank,
            r.source,
            fmt_money(&r.amount),
            r.rate.to_string(),
            fmt_money(&total),
        ]);
    }
    let total_header = format!("Total ({})", currency);
    println!(
        "{}",
        pretty_table(
            &[
                "Bill", "Date", "Agent", "Client", "Group", "Bank", "Source", "Amount", "Rate",
                total_header.as_str(),
            ],
            data
        )
    );
    println!("Commission total: {} {}", fmt_money(&grand), currency);
    Ok(())
}
