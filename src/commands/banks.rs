// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::registry::{create_bank, delete_bank, list_banks};
use crate::utils::{id_for_bank, maybe_print_json, pretty_table};
use anyhow::Result;
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = sub.get_one::<String>("name").unwrap();
            let bank = create_bank(conn, name)?;
            println!("Added bank '{}' (id {})", bank.bank_name, bank.id);
        }
        Some(("list", sub)) => {
            let banks = list_banks(conn)?;
            if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &banks)? {
                return Ok(());
            }
            let data = banks
                .into_iter()
                .map(|b| vec![b.id.to_string(), b.bank_name])
                .collect();
            println!("{}", pretty_table(&["ID", "Bank"], data));
        }
        Some(("rm", sub)) => {
            let name = sub.get_one::<String>("name").unwrap();
            let id = id_for_bank(conn, name)?;
            delete_bank(conn, id)?;
            println!("Removed bank '{}'", name);
        }
        _ => {}
    }
    Ok(())
}
