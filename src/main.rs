// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use billdesk::config::AppConfig;
use billdesk::error::BillingError;
use billdesk::{cli, commands, db};

fn init_tracing(cfg: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(mut cfg: AppConfig) -> Result<()> {
    let matches = cli::build_cli().get_matches();
    if let Some(p) = matches.get_one::<String>("db") {
        cfg.db_path = Some(PathBuf::from(p));
    }

    let mut conn = db::open_or_init(&cfg)?;

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database initialized at {}", db::db_path(&cfg)?.display());
        }
        Some(("bank", sub)) => commands::banks::handle(&conn, sub)?,
        Some(("group", sub)) => commands::groups::handle(&conn, sub)?,
        Some(("user", sub)) => commands::users::handle(&conn, sub)?,
        Some(("bill", sub)) => commands::bills::handle(&mut conn, sub)?,
        Some(("agent-bill", sub)) => commands::agent_bills::handle(&conn, sub)?,
        Some(("other-bill", sub)) => commands::other_bills::handle(&conn, sub)?,
        Some(("fx", sub)) => commands::fx::handle(&conn, &cfg, sub)?,
        Some(("report", sub)) => commands::reports::handle(&conn, sub)?,
        Some(("export", sub)) => commands::exporter::handle(&conn, sub)?,
        Some(("doctor", _)) => commands::doctor::handle(&conn)?,
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cfg = AppConfig::from_env();
    init_tracing(&cfg);

    match run(cfg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<BillingError>()
                .map(BillingError::exit_code)
                .unwrap_or(1);
            debug!(code, "command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(code)
        }
    }
}
