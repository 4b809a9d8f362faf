// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use billdesk::agent_bill::{get_agent_bill, sync_agent_bill};
use billdesk::bill::{BillInput, create_bill, delete_bill, update_bill};
use billdesk::db;
use billdesk::error::BillingError;
use billdesk::models::Source;
use chrono::NaiveDate;
use rusqlite::{Connection, params};
use rust_decimal::Decimal;

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Acme Claims (per-bank, HDFC = 7.5), client Acme Corp, agent Jane {Claimer: 1.2}.
fn setup() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    db::init_schema(&conn).unwrap();
    conn.execute_batch(
        r#"
        INSERT INTO banks(id, bank_name) VALUES (1, 'SBI'), (2, 'HDFC');
        INSERT INTO users(id, name, email, password, role, rate)
            VALUES (10, 'Acme Corp', 'acme@example.com', 'x', 'Client', NULL);
        INSERT INTO users(id, name, email, password, role, rate)
            VALUES (20, 'Jane', 'jane@example.com', 'x', 'Agent', '{"Claimer":1.2}');
        INSERT INTO groups(id, name, type, owner, same_rate) VALUES (5, 'Acme Claims', 'Claim', 10, NULL);
        INSERT INTO group_bank_rate(group_id, bank_id, rate) VALUES (5, 2, '7.5');
        "#,
    )
    .unwrap();
    conn
}

fn jane_bill() -> BillInput {
    BillInput {
        bill_date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
        group_id: 5,
        bank_id: Some(2),
        client_id: 10,
        agent_id: 20,
        amount: dec("100"),
        rate: None,
    }
}

fn agent_bill_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM agent_bill", [], |r| r.get(0))
        .unwrap()
}

#[test]
fn claim_bill_derives_commission_from_agent_rate() {
    let mut conn = setup();
    let bill = create_bill(&mut conn, &jane_bill()).unwrap();
    assert_eq!(bill.rate, None);

    let ab = get_agent_bill(&conn, bill.id).unwrap().unwrap();
    assert_eq!(ab.source, Source::Claim);
    assert_eq!(ab.rate, dec("1.2"));
    assert_eq!(ab.total, dec("120"));
    assert_eq!(ab.bank_id, Some(2));
    assert_eq!(ab.client_id, 10);
}

#[test]
fn resync_is_idempotent() {
    let mut conn = setup();
    let bill = create_bill(&mut conn, &jane_bill()).unwrap();
    let first = sync_agent_bill(&conn, bill.id).unwrap().unwrap();
    let second = sync_agent_bill(&conn, bill.id).unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(agent_bill_count(&conn), 1);
}

#[test]
fn moving_group_to_processing_removes_agent_bill() {
    let mut conn = setup();
    let bill = create_bill(&mut conn, &jane_bill()).unwrap();
    assert_eq!(agent_bill_count(&conn), 1);

    conn.execute("UPDATE groups SET type='Processing' WHERE id=5", [])
        .unwrap();
    update_bill(&mut conn, bill.id, &jane_bill()).unwrap();
    assert!(get_agent_bill(&conn, bill.id).unwrap().is_none());
    assert_eq!(agent_bill_count(&conn), 0);
}

#[test]
fn depo_without_depositer_key_is_zero_commission() {
    let mut conn = setup();
    conn.execute("UPDATE groups SET type='Depo' WHERE id=5", [])
        .unwrap();
    let bill = create_bill(&mut conn, &jane_bill()).unwrap();
    let ab = get_agent_bill(&conn, bill.id).unwrap().unwrap();
    assert_eq!(ab.source, Source::Depo);
    assert!(ab.rate.is_zero());
    assert!(ab.total.is_zero());
}

#[test]
fn agent_rates_take_precedence_over_generic_rate() {
    let mut conn = setup();
    conn.execute(
        "UPDATE users SET agent_rates=?1 WHERE id=20",
        params![r#"{"claimer": "2.5", "default": 1}"#],
    )
    .unwrap();
    let bill = create_bill(&mut conn, &jane_bill()).unwrap();
    let ab = get_agent_bill(&conn, bill.id).unwrap().unwrap();
    assert_eq!(ab.rate, dec("2.5"));
    assert_eq!(ab.total, dec("250"));
}

#[test]
fn update_refreshes_the_snapshot() {
    let mut conn = setup();
    let bill = create_bill(&mut conn, &jane_bill()).unwrap();
    let mut edit = jane_bill();
    edit.amount = dec("250");
    edit.bill_date = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
    update_bill(&mut conn, bill.id, &edit).unwrap();

    let ab = get_agent_bill(&conn, bill.id).unwrap().unwrap();
    assert_eq!(ab.amount, dec("250"));
    assert_eq!(ab.total, dec("300"));
    assert_eq!(ab.bill_date, edit.bill_date);
    assert_eq!(agent_bill_count(&conn), 1);
}

#[test]
fn failed_agent_bill_write_rolls_back_the_bill() {
    let mut conn = setup();
    conn.execute_batch(
        "CREATE TRIGGER block_agent_bill BEFORE INSERT ON agent_bill
         BEGIN SELECT RAISE(ABORT, 'agent bill blocked'); END;",
    )
    .unwrap();
    assert!(create_bill(&mut conn, &jane_bill()).is_err());
    let bills: i64 = conn
        .query_row("SELECT COUNT(*) FROM bill", [], |r| r.get(0))
        .unwrap();
    assert_eq!(bills, 0);
}

#[test]
fn deleting_a_bill_cascades_to_its_agent_bill() {
    let mut conn = setup();
    let bill = create_bill(&mut conn, &jane_bill()).unwrap();
    delete_bill(&conn, bill.id).unwrap();
    assert_eq!(agent_bill_count(&conn), 0);
}

#[test]
fn sync_of_missing_bill_is_a_no_op() {
    let conn = setup();
    assert!(sync_agent_bill(&conn, 999).unwrap().is_none());
}

#[test]
fn commission_overflow_rejects_the_write() {
    let mut conn = setup();
    let mut huge = jane_bill();
    huge.amount = Decimal::MAX;
    let err = create_bill(&mut conn, &huge).unwrap_err();
    assert!(matches!(err, BillingError::Validation(_)));
    assert_eq!(err.status(), 400);
    let bills: i64 = conn
        .query_row("SELECT COUNT(*) FROM bill", [], |r| r.get(0))
        .unwrap();
    assert_eq!(bills, 0);
    assert_eq!(agent_bill_count(&conn), 0);

    let bill = create_bill(&mut conn, &jane_bill()).unwrap();
    assert!(update_bill(&mut conn, bill.id, &huge).is_err());
    let ab = get_agent_bill(&conn, bill.id).unwrap().unwrap();
    assert_eq!(ab.amount, dec("100"));
    assert_eq!(ab.total, dec("120"));
}
