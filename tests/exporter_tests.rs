// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use billdesk::bill::{BillInput, create_bill};
use billdesk::{cli, commands::exporter, db};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use tempfile::tempdir;

fn base_conn() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    conn.execute_batch(
        r#"
        INSERT INTO banks(id, bank_name) VALUES (2, 'HDFC');
        INSERT INTO users(id, name, email, password, role, rate) VALUES
            (10, 'Acme Corp', 'acme@example.com', 'x', 'Client', NULL),
            (20, 'Jane', 'jane@example.com', 'x', 'Agent', '{"Claimer":1.2}');
        INSERT INTO groups(id, name, type, owner, same_rate) VALUES (5, 'Acme Claims', 'Claim', 10, NULL);
        INSERT INTO group_bank_rate(group_id, bank_id, rate) VALUES (5, 2, '7.5');
        "#,
    )
    .unwrap();
    create_bill(
        &mut conn,
        &BillInput {
            bill_date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
            group_id: 5,
            bank_id: Some(2),
            client_id: 10,
            agent_id: 20,
            amount: "100".parse().unwrap(),
            rate: None,
        },
    )
    .unwrap();
    conn
}

fn run_export(conn: &Connection, what: &str, format: &str, out: &str) -> anyhow::Result<()> {
    let matches = cli::build_cli().get_matches_from([
        "billdesk", "export", what, "--format", format, "--out", out,
    ]);
    if let Some(("export", export_m)) = matches.subcommand() {
        exporter::handle(conn, export_m)
    } else {
        panic!("no export subcommand");
    }
}

#[test]
fn export_agent_bills_writes_pretty_json() {
    let conn = base_conn();
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("agent_bills.json");
    let out_str = out_path.to_string_lossy().to_string();

    run_export(&conn, "agent-bills", "json", &out_str).unwrap();

    let contents = std::fs::read_to_string(&out_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(parsed[0]["bill_date"], json!("2026-03-05"));
    assert_eq!(parsed[0]["agent"], json!("Jane"));
    assert_eq!(parsed[0]["client"], json!("Acme Corp"));
    assert_eq!(parsed[0]["bank"], json!("HDFC"));
    assert_eq!(parsed[0]["source"], json!("Claim"));
    assert_eq!(parsed[0]["rate"], json!("1.2"));
}

#[test]
fn export_bills_writes_csv_with_client_totals() {
    let conn = base_conn();
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("bills.csv");
    let out_str = out_path.to_string_lossy().to_string();

    run_export(&conn, "bills", "csv", &out_str).unwrap();

    let mut rdr = csv::Reader::from_path(&out_path).unwrap();
    let headers = rdr.headers().unwrap().clone();
    assert_eq!(&headers[0], "id");
    assert_eq!(&headers[9], "total");
    let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][2], "Acme Claims");
    assert_eq!(&rows[0][8], "7.5");
    assert_eq!(rows[0][9].parse::<f64>().unwrap(), 750.0);
}

#[test]
fn export_rejects_unknown_format() {
    let conn = base_conn();
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("export.unknown");
    let out_str = out_path.to_string_lossy().to_string();

    assert!(run_export(&conn, "bills", "xml", &out_str).is_err());
    assert!(!out_path.exists());
}
