// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::BillingError;
use crate::models::GroupType;
use crate::registry::{
    NewGroup, create_group, delete_group, list_group_bank_rates, list_groups, set_group_type,
    set_same_rate, upsert_group_bank_rate,
};
use crate::utils::{
    id_for_bank, id_for_group, id_for_user, maybe_print_json, parse_decimal, pretty_table,
};
use anyhow::Result;
use rusqlite::{Connection, params};

fn group_type_arg(sub: &clap::ArgMatches) -> Result<GroupType> {
    let raw = sub.get_one::<String>("type").unwrap();
    GroupType::parse(raw).ok_or_else(|| {
        BillingError::validation(format!(
            "Unknown group type '{}' (use Claim|Depo|Processing|Payment)",
            raw
        ))
        .into()
    })
}

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let owner = id_for_user(conn, sub.get_one::<String>("owner").unwrap())?;
            let same_rate = sub
                .get_one::<String>("same-rate")
                .map(|s| parse_decimal(s))
                .transpose()?;
            let group = create_group(
                conn,
                &NewGroup {
                    name: sub.get_one::<String>("name").unwrap().clone(),
                    group_type: group_type_arg(sub)?,
                    owner,
                    same_rate,
                },
            )?;
            println!("Added group '{}' (id {})", group.name, group.id);
        }
        Some(("list", sub)) => list(conn, sub)?,
        Some(("set-type", sub)) => {
            let id = id_for_group(conn, sub.get_one::<String>("group").unwrap())?;
            let t = group_type_arg(sub)?;
            set_group_type(conn, id, t)?;
            println!("Group type set to {}; existing bills re-sync on their next edit", t.as_str());
        }
        Some(("set-same-rate", sub)) => {
            let id = id_for_group(conn, sub.get_one::<String>("group").unwrap())?;
            let rate = if sub.get_flag("clear") {
                None
            } else {
                let raw = sub.get_one::<String>("rate").ok_or_else(|| {
                    BillingError::validation("Pass --rate or --clear")
                })?;
                Some(parse_decimal(raw)?)
            };
            set_same_rate(conn, id, rate)?;
            match rate {
                Some(r) => println!("Same rate set to {}", r),
                None => println!("Group now uses per-bank rates"),
            }
        }
        Some(("set-bank-rate", sub)) => {
            let gid = id_for_group(conn, sub.get_one::<String>("group").unwrap())?;
            let bid = id_for_bank(conn, sub.get_one::<String>("bank").unwrap())?;
            let rate = parse_decimal(sub.get_one::<String>("rate").unwrap())?;
            upsert_group_bank_rate(conn, gid, bid, rate)?;
            println!("Bank rate set to {}", rate);
        }
        Some(("rates", sub)) => rates(conn, sub)?,
        Some(("rm", sub)) => {
            let name = sub.get_one::<String>("group").unwrap();
            let id = id_for_group(conn, name)?;
            delete_group(conn, id)?;
            println!("Removed group '{}' and its bills", name);
        }
        _ => {}
    }
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let groups = list_groups(conn)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &groups)? {
        return Ok(());
    }
    let mut data = Vec::new();
    for g in groups {
        let owner: String = conn.query_row(
            "SELECT name FROM users WHERE id=?1",
            params![g.owner],
            |r| r.get(0),
        )?;
        data.push(vec![
            g.id.to_string(),
            g.name,
            g.r#type,
            owner,
            g.same_rate
                .map(|r| r.to_string())
                .unwrap_or_else(|| "per bank".into()),
        ]);
    }
    println!(
        "{}",
        pretty_table(&["ID", "Group", "Type", "Owner", "Rate"], data)
    );
    Ok(())
}

fn rates(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let gid = sub
        .get_one::<String>("group")
        .map(|g| id_for_group(conn, g))
        .transpose()?;
    let rates = list_group_bank_rates(conn, gid)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &rates)? {
        return Ok(());
    }
    let mut data = Vec::new();
    for r in rates {
        let (group, bank): (String, String) = conn.query_row(
            "SELECT g.name, b.bank_name FROM groups g, banks b WHERE g.id=?1 AND b.id=?2",
            params![r.group_id, r.bank_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        data.push(vec![group, bank, r.rate.to_string()]);
    }
    println!("{}", pretty_table(&["Group", "Bank", "Rate"], data));
    Ok(())
}
