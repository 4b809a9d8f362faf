// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::BillingError;
use crate::models::Role;
use crate::rates::Rate;
use crate::registry::{NewUser, create_user, delete_user, list_users, set_password, set_user_rates};
use crate::utils::{id_for_user, maybe_print_json, pretty_table};
use anyhow::Result;
use rusqlite::Connection;

fn rate_arg(sub: &clap::ArgMatches, name: &str) -> Result<Option<Rate>> {
    match sub.get_one::<String>(name) {
        None => Ok(None),
        Some(raw) => Rate::parse_cli(raw).map(Some).ok_or_else(|| {
            BillingError::validation(format!(
                "Invalid --{} '{}' (use 5, Claimer=5,Depositer=3 or JSON)",
                name, raw
            ))
            .into()
        }),
    }
}

fn role_arg(raw: &str) -> Result<Role> {
    Role::parse(raw).ok_or_else(|| {
        BillingError::validation(format!("Unknown role '{}' (use Client|Agent)", raw)).into()
    })
}

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let user = create_user(
                conn,
                &NewUser {
                    name: sub.get_one::<String>("name").unwrap().clone(),
                    email: sub.get_one::<String>("email").unwrap().clone(),
                    password: sub.get_one::<String>("password").unwrap().clone(),
                    role: role_arg(sub.get_one::<String>("role").unwrap())?,
                    phone: sub.get_one::<String>("phone").cloned(),
                    worktype: sub.get_one::<String>("worktype").cloned(),
                    rate: rate_arg(sub, "rate")?,
                    agent_rates: rate_arg(sub, "agent-rates")?,
                },
            )?;
            println!("Added {} '{}' (id {})", user.role, user.name, user.id);
        }
        Some(("list", sub)) => {
            let role = sub
                .get_one::<String>("role")
                .map(|r| role_arg(r))
                .transpose()?;
            let users = list_users(conn, role)?;
            if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &users)? {
                return Ok(());
            }
            let data = users
                .into_iter()
                .map(|u| {
                    let worktypes = u.worktypes().join(", ");
                    vec![
                        u.id.to_string(),
                        u.name,
                        u.email,
                        u.role,
                        worktypes,
                        u.rate.map(|r| r.to_db()).unwrap_or_default(),
                        u.agent_rates.map(|r| r.to_db()).unwrap_or_default(),
                    ]
                })
                .collect();
            println!(
                "{}",
                pretty_table(
                    &["ID", "Name", "Email", "Role", "Worktype", "Rate", "Agent rates"],
                    data
                )
            );
        }
        Some(("set-rates", sub)) => {
            let id = id_for_user(conn, sub.get_one::<String>("user").unwrap())?;
            let rate = rate_arg(sub, "rate")?;
            let agent_rates = rate_arg(sub, "agent-rates")?;
            if rate.is_none() && agent_rates.is_none() {
                return Err(BillingError::validation("Pass --rate and/or --agent-rates").into());
            }
            set_user_rates(conn, id, rate.as_ref(), agent_rates.as_ref())?;
            println!("Rates updated; existing agent bills re-sync on their next edit");
        }
        Some(("passwd", sub)) => {
            let id = id_for_user(conn, sub.get_one::<String>("user").unwrap())?;
            set_password(conn, id, sub.get_one::<String>("password").unwrap())?;
            println!("Password updated");
        }
        Some(("rm", sub)) => {
            let key = sub.get_one::<String>("user").unwrap();
            let id = id_for_user(conn, key)?;
            delete_user(conn, id)?;
            println!("Removed user {}", key);
        }
        _ => {}
    }
    Ok(())
}
