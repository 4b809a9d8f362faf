// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, value_parser};

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print JSON"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .conflicts_with("json")
            .help("Print one JSON object per line"),
    )
}

fn opt(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).help(help)
}

fn req(name: &'static str, help: &'static str) -> Arg {
    opt(name, help).required(true)
}

fn bill_fields(cmd: Command, required: bool) -> Command {
    cmd.arg(opt("date", "Bill date YYYY-MM-DD").required(required))
        .arg(opt("group", "Group name").required(required))
        .arg(opt("agent", "Agent id or email").required(required))
        .arg(opt("amount", "Amount in USD").required(required))
        .arg(opt("bank", "Bank name (optional for same-rate groups)"))
        .arg(opt("client", "Client id or email; defaults to the group owner"))
        .arg(opt("rate", "Informational rate override"))
}

pub fn build_cli() -> Command {
    Command::new("billdesk")
        .about("Claim/deposit brokerage billing with derived agent commissions")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("db")
                .long("db")
                .global(true)
                .help("Database file (overrides BILLDESK_DB)"),
        )
        .subcommand(Command::new("init").about("Create the database and bootstrap the admin"))
        .subcommand(
            Command::new("bank")
                .about("Manage banks")
                .subcommand(Command::new("add").arg(req("name", "Bank name")))
                .subcommand(json_flags(Command::new("list")))
                .subcommand(Command::new("rm").arg(req("name", "Bank name"))),
        )
        .subcommand(
            Command::new("group")
                .about("Manage billing groups and their rates")
                .subcommand(
                    Command::new("add")
                        .arg(req("name", "Group name"))
                        .arg(req("type", "Claim | Depo | Processing | Payment"))
                        .arg(req("owner", "Client id or email"))
                        .arg(opt("same-rate", "One rate for every bank")),
                )
                .subcommand(json_flags(Command::new("list")))
                .subcommand(
                    Command::new("set-type")
                        .arg(req("group", "Group name"))
                        .arg(req("type", "Claim | Depo | Processing | Payment")),
                )
                .subcommand(
                    Command::new("set-same-rate")
                        .arg(req("group", "Group name"))
                        .arg(opt("rate", "New same rate").conflicts_with("clear"))
                        .arg(
                            Arg::new("clear")
                                .long("clear")
                                .action(ArgAction::SetTrue)
                                .help("Switch the group to per-bank rates"),
                        ),
                )
                .subcommand(
                    Command::new("set-bank-rate")
                        .arg(req("group", "Group name"))
                        .arg(req("bank", "Bank name"))
                        .arg(req("rate", "Rate for this bank")),
                )
                .subcommand(json_flags(
                    Command::new("rates").arg(opt("group", "Only this group")),
                ))
                .subcommand(Command::new("rm").arg(req("group", "Group name"))),
        )
        .subcommand(
            Command::new("user")
                .about("Manage clients and agents")
                .subcommand(
                    Command::new("add")
                        .arg(req("name", "Display name"))
                        .arg(req("email", "Unique email"))
                        .arg(req("password", "Login password"))
                        .arg(req("role", "Client | Agent"))
                        .arg(opt("phone", "Phone number"))
                        .arg(opt("worktype", "Comma-separated, e.g. Claimer,Depositer"))
                        .arg(opt("rate", "Generic rate: 5 or Claimer=5,Depositer=3"))
                        .arg(opt("agent-rates", "Agent rates, same syntax as --rate")),
                )
                .subcommand(json_flags(
                    Command::new("list").arg(opt("role", "Only users with this role")),
                ))
                .subcommand(
                    Command::new("set-rates")
                        .arg(req("user", "User id or email"))
                        .arg(opt("rate", "Generic rate"))
                        .arg(opt("agent-rates", "Agent rates")),
                )
                .subcommand(
                    Command::new("passwd")
                        .arg(req("user", "User id or email"))
                        .arg(req("password", "New password")),
                )
                .subcommand(Command::new("rm").arg(req("user", "User id or email"))),
        )
        .subcommand(
            Command::new("bill")
                .about("Create, edit and upload bills")
                .subcommand(bill_fields(Command::new("add"), true))
                .subcommand(bill_fields(
                    Command::new("update").arg(
                        req("id", "Bill id").value_parser(value_parser!(i64)),
                    ),
                    false,
                ))
                .subcommand(
                    Command::new("rm").arg(req("id", "Bill id").value_parser(value_parser!(i64))),
                )
                .subcommand(json_flags(
                    Command::new("show").arg(req("id", "Bill id").value_parser(value_parser!(i64))),
                ))
                .subcommand(json_flags(
                    Command::new("list")
                        .arg(opt("type", "Group type filter"))
                        .arg(opt("group", "Group name"))
                        .arg(opt("agent", "Agent id or email"))
                        .arg(opt("client", "Client id or email"))
                        .arg(opt("month", "YYYY-MM"))
                        .arg(opt("currency", "Show totals in this currency"))
                        .arg(opt("limit", "Max rows").value_parser(value_parser!(usize))),
                ))
                .subcommand(
                    Command::new("upload")
                        .about("Validate a sheet and insert every row, or none")
                        .arg(req("path", "CSV or Excel file with Date, Group, Agent, Bank, Amount, Total"))
                        .arg(
                            Arg::new("json")
                                .long("json")
                                .action(ArgAction::SetTrue)
                                .help("Print the result as JSON"),
                        ),
                ),
        )
        .subcommand(
            Command::new("agent-bill")
                .about("Derived agent commissions")
                .subcommand(json_flags(
                    Command::new("list")
                        .arg(opt("agent", "Agent id or email"))
                        .arg(opt("client", "Client id or email"))
                        .arg(opt("source", "Claim | Depo"))
                        .arg(opt("month", "YYYY-MM"))
                        .arg(opt("currency", "Show totals in this currency")),
                )),
        )
        .subcommand(
            Command::new("other-bill")
                .about("Manual entries outside commission derivation")
                .subcommand(
                    Command::new("add")
                        .arg(req("kind", "client | agent"))
                        .arg(req("date", "YYYY-MM-DD"))
                        .arg(req("amount", "Amount in USD"))
                        .arg(opt("client", "Client id or email (kind=client)"))
                        .arg(opt("group", "Group name (kind=client)"))
                        .arg(opt("agent", "Agent id or email (kind=agent)"))
                        .arg(opt("note", "Description")),
                )
                .subcommand(json_flags(
                    Command::new("list").arg(opt("kind", "client | agent")),
                ))
                .subcommand(
                    Command::new("rm").arg(req("id", "Entry id").value_parser(value_parser!(i64))),
                ),
        )
        .subcommand(
            Command::new("fx")
                .about("USD exchange rates")
                .subcommand(
                    Command::new("set")
                        .arg(req("date", "YYYY-MM-DD"))
                        .arg(req("quote", "Quote currency"))
                        .arg(req("rate", "1 USD in quote currency")),
                )
                .subcommand(Command::new("list"))
                .subcommand(
                    Command::new("fetch")
                        .arg(
                            opt("days", "Days of history")
                                .value_parser(value_parser!(usize))
                                .default_value("30"),
                        )
                        .arg(opt("to", "Comma-separated quote currencies").default_value("EUR,GBP,INR")),
                )
                .subcommand(
                    Command::new("convert")
                        .arg(req("date", "YYYY-MM-DD"))
                        .arg(req("amount", "Amount"))
                        .arg(opt("from", "Source currency").default_value("USD"))
                        .arg(req("to", "Target currency")),
                ),
        )
        .subcommand(
            Command::new("report")
                .about("Commission and billing summaries")
                .subcommand(json_flags(
                    Command::new("agents").arg(opt("month", "YYYY-MM")),
                ))
                .subcommand(json_flags(
                    Command::new("clients").arg(opt("month", "YYYY-MM")),
                )),
        )
        .subcommand(
            Command::new("export")
                .about("Export bills")
                .subcommand(
                    Command::new("bills")
                        .arg(opt("format", "csv | json").default_value("csv"))
                        .arg(req("out", "Output file")),
                )
                .subcommand(
                    Command::new("agent-bills")
                        .arg(opt("format", "csv | json").default_value("csv"))
                        .arg(req("out", "Output file")),
                ),
        )
        .subcommand(Command::new("doctor").about("Check bills and reference data for gaps"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_is_well_formed() {
        build_cli().debug_assert();
    }
}
