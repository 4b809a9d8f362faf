// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::agent_bill::get_agent_bill;
use crate::bill::{
    BillFilter, BillInput, client_rate, create_bill, delete_bill, get_bill, list_bills,
    update_bill,
};
use crate::bulk::{BulkOutcome, upload_file};
use crate::error::BillingError;
use crate::models::{Bill, GroupType};
use crate::registry::get_group;
use crate::utils::{
    BASE_CURRENCY, fmt_money, fx_convert, id_for_bank, id_for_group, id_for_user,
    maybe_print_json, parse_date, parse_decimal, parse_month, pretty_table,
};
use anyhow::Result;
use rusqlite::Connection;
use serde_json::json;
use std::path::Path;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let input = input_from_args(conn, sub, None)?;
            let bill = create_bill(conn, &input)?;
            println!("Added bill {}", bill.id);
            print_commission(conn, bill.id)?;
        }
        Some(("update", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            let current = get_bill(conn, id)?;
            let input = input_from_args(conn, sub, Some(&current))?;
            let bill = update_bill(conn, id, &input)?;
            println!("Updated bill {}", bill.id);
            print_commission(conn, bill.id)?;
        }
        Some(("rm", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            delete_bill(conn, id)?;
            println!("Removed bill {}", id);
        }
        Some(("show", sub)) => show(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("upload", sub)) => upload(conn, sub)?,
        _ => {}
    }
    Ok(())
}

/// Fields absent on the command line fall back to `current` (update) or,
/// for the client, to the group owner.
fn input_from_args(
    conn: &Connection,
    sub: &clap::ArgMatches,
    current: Option<&Bill>,
) -> Result<BillInput> {
    let arg = |name: &str| sub.get_one::<String>(name);
    let missing = |name: &str| BillingError::validation(format!("--{} is required", name));

    let bill_date = match (arg("date"), current) {
        (Some(s), _) => parse_date(s)?,
        (None, Some(b)) => b.bill_date,
        (None, None) => return Err(missing("date").into()),
    };
    let group_id = match (arg("group"), current) {
        (Some(s), _) => id_for_group(conn, s)?,
        (None, Some(b)) => b.group_id,
        (None, None) => return Err(missing("group").into()),
    };
    let agent_id = match (arg("agent"), current) {
        (Some(s), _) => id_for_user(conn, s)?,
        (None, Some(b)) => b.agent_id,
        (None, None) => return Err(missing("agent").into()),
    };
    let amount = match (arg("amount"), current) {
        (Some(s), _) => parse_decimal(s)?,
        (None, Some(b)) => b.amount,
        (None, None) => return Err(missing("amount").into()),
    };
    let bank_id = match (arg("bank"), current) {
        (Some(s), _) if s.trim().is_empty() || s.trim() == "-" => None,
        (Some(s), _) => Some(id_for_bank(conn, s)?),
        (None, Some(b)) => b.bank_id,
        (None, None) => None,
    };
    let rate = match (arg("rate"), current) {
        (Some(s), _) => Some(parse_decimal(s)?),
        (None, Some(b)) => b.rate,
        (None, None) => None,
    };
    let client_id = match arg("client") {
        Some(s) => id_for_user(conn, s)?,
        None => get_group(conn, group_id)?.owner,
    };
    Ok(BillInput {
        bill_date,
        group_id,
        bank_id,
        client_id,
        agent_id,
        amount,
        rate,
    })
}

fn print_commission(conn: &Connection, bill_id: i64) -> Result<()> {
    match get_agent_bill(conn, bill_id)? {
        Some(ab) => println!(
            "Agent commission: {} x {} = {} ({})",
            fmt_money(&ab.amount),
            ab.rate,
            fmt_money(&ab.total),
            ab.source
        ),
        None => println!("No agent commission for this group type"),
    }
    Ok(())
}

fn show(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let id = *sub.get_one::<i64>("id").unwrap();
    let bill = get_bill(conn, id)?;
    let rate = client_rate(conn, &bill).ok();
    let agent_bill = get_agent_bill(conn, id)?;
    let v = json!({
        "bill": bill,
        "clientRate": rate,
        "clientTotal": rate.and_then(|r| bill.amount.checked_mul(r)),
        "agentBill": agent_bill,
    });
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &v)? {
        return Ok(());
    }
    let group = get_group(conn, bill.group_id)?;
    let mut data = vec![
        vec!["Date".into(), bill.bill_date.to_string()],
        vec!["Group".into(), format!("{} ({})", group.name, group.r#type)],
        vec!["Amount".into(), fmt_money(&bill.amount)],
        vec![
            "Client rate".into(),
            rate.map(|r| r.to_string()).unwrap_or_else(|| "unresolved".into()),
        ],
    ];
    if let Some(ab) = agent_bill {
        data.push(vec!["Source".into(), ab.source.to_string()]);
        data.push(vec!["Agent rate".into(), ab.rate.to_string()]);
        data.push(vec!["Agent total".into(), fmt_money(&ab.total)]);
    }
    println!("{}", pretty_table(&["Field", "Value"], data));
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let group_type = sub
        .get_one::<String>("type")
        .map(|t| {
            GroupType::parse(t)
                .ok_or_else(|| BillingError::validation(format!("Unknown group type '{}'", t)))
        })
        .transpose()?;
    let filter = BillFilter {
        group_type,
        group_id: sub
            .get_one::<String>("group")
            .map(|g| id_for_group(conn, g))
            .transpose()?,
        agent_id: sub
            .get_one::<String>("agent")
            .map(|a| id_for_user(conn, a))
            .transpose()?,
        client_id: sub
            .get_one::<String>("client")
            .map(|c| id_for_user(conn, c))
            .transpose()?,
        month: sub
            .get_one::<String>("month")
            .map(|s| parse_month(s))
            .transpose()?,
        limit: sub.get_one::<usize>("limit").copied(),
    };
    let currency = sub
        .get_one::<String>("currency")
        .map(|c| c.to_uppercase())
        .unwrap_or_else(|| BASE_CURRENCY.to_string());

    let rows = list_bills(conn, &filter)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &rows)? {
        return Ok(());
    }
    let mut data = Vec::new();
    for r in rows {
        let total = match r.total {
            Some(t) => {
                let date = parse_date(&r.bill_date)?;
                fmt_money(&fx_convert(conn, date, t, BASE_CURRENCY, &currency)?)
            }
            None => "-".into(),
        };
        data.push(vec![
            r.id.to_string(),
            r.bill_date,
            r.group,
            r.group_type,
            r.bank,
            r.client,
            r.agent,
            fmt_money(&r.amount),
            r.rate.map(|x| x.to_string()).unwrap_or_else(|| "-".into()),
            total,
        ]);
    }
    let total_header = format!("Total ({})", currency);
    println!(
        "{}",
        pretty_table(
            &[
                "ID", "Date", "Group", "Type", "Bank", "Client", "Agent", "Amount", "Rate",
                total_header.as_str(),
            ],
            data
        )
    );
    Ok(())
}

fn upload(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let path = sub.get_one::<String>("path").unwrap();
    let as_json = sub.get_flag("json");
    match upload_file(conn, Path::new(path.trim()))? {
        BulkOutcome::Inserted(summary) => {
            if as_json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Uploaded {} bills from {} rows",
                    summary.inserted, summary.total_rows
                );
            }
            Ok(())
        }
        BulkOutcome::Rejected(report) => {
            if as_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let data = report
                    .errors
                    .iter()
                    .map(|f| vec![f.row_number.to_string(), f.errors.join("; ")])
                    .collect();
                println!("{}", pretty_table(&["Row", "Errors"], data));
            }
            Err(BillingError::validation(format!(
                "{} of {} rows failed validation; no bills were inserted",
                report.failed_rows, report.total_rows
            ))
            .into())
        }
    }
}
