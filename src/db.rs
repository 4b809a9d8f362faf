// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::{Connection, Row, params};
use rust_decimal::Decimal;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::AppConfig;
use crate::models::Role;
use crate::registry;

static APP: Lazy<(&str, &str, &str)> = Lazy::new(|| ("com.alphavelocity", "Billdesk", "billdesk"));

pub fn db_path(cfg: &AppConfig) -> Result<PathBuf> {
    if let Some(p) = &cfg.db_path {
        return Ok(p.clone());
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("billdesk.sqlite"))
}

pub fn open_or_init(cfg: &AppConfig) -> Result<Connection> {
    let path = db_path(cfg)?;
    let conn = open_at(&path)?;
    bootstrap_admin(&conn, cfg)?;
    Ok(conn)
}

pub fn open_at(path: &Path) -> Result<Connection> {
    info!(path = %path.display(), "opening database");
    let conn =
        Connection::open(path).with_context(|| format!("Open DB at {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates every table if missing and enables foreign keys for this
/// connection, which the `agent_bill` cascade depends on.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS banks(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        bank_name TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS users(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        phone TEXT,
        worktype TEXT,
        role TEXT NOT NULL,
        rate TEXT,          -- JSON: number or {worktype: number}
        agent_rates TEXT,   -- JSON, same shape as rate
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS groups(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        type TEXT NOT NULL,
        owner INTEGER NOT NULL,
        same_rate TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(owner) REFERENCES users(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS group_bank_rate(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        group_id INTEGER NOT NULL,
        bank_id INTEGER NOT NULL,
        rate TEXT NOT NULL,
        UNIQUE(group_id, bank_id),
        FOREIGN KEY(group_id) REFERENCES groups(id) ON DELETE CASCADE,
        FOREIGN KEY(bank_id) REFERENCES banks(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS bill(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        bill_date TEXT NOT NULL,
        group_id INTEGER NOT NULL,
        bank_id INTEGER,
        client_id INTEGER NOT NULL,
        agent_id INTEGER NOT NULL,
        amount TEXT NOT NULL,
        rate TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(group_id) REFERENCES groups(id) ON DELETE CASCADE,
        FOREIGN KEY(bank_id) REFERENCES banks(id) ON DELETE CASCADE,
        FOREIGN KEY(client_id) REFERENCES users(id) ON DELETE CASCADE,
        FOREIGN KEY(agent_id) REFERENCES users(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_bill_date ON bill(bill_date);

    CREATE TABLE IF NOT EXISTS agent_bill(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        bill_id INTEGER NOT NULL UNIQUE,
        bill_date TEXT NOT NULL,
        group_id INTEGER NOT NULL,
        client_id INTEGER NOT NULL,
        agent_id INTEGER NOT NULL,
        source TEXT NOT NULL CHECK(source IN ('Claim','Depo')),
        bank_id INTEGER,
        amount TEXT NOT NULL,
        rate TEXT NOT NULL,
        total TEXT NOT NULL,
        FOREIGN KEY(bill_id) REFERENCES bill(id) ON DELETE CASCADE,
        FOREIGN KEY(group_id) REFERENCES groups(id) ON DELETE CASCADE,
        FOREIGN KEY(client_id) REFERENCES users(id) ON DELETE CASCADE,
        FOREIGN KEY(agent_id) REFERENCES users(id) ON DELETE CASCADE,
        FOREIGN KEY(bank_id) REFERENCES banks(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_agent_bill_agent ON agent_bill(agent_id);

    CREATE TABLE IF NOT EXISTS other_bill(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        bill_date TEXT NOT NULL,
        kind TEXT NOT NULL CHECK(kind IN ('client','agent')),
        client_id INTEGER,
        group_id INTEGER,
        agent_id INTEGER,
        amount TEXT NOT NULL,
        description TEXT,
        FOREIGN KEY(client_id) REFERENCES users(id) ON DELETE CASCADE,
        FOREIGN KEY(group_id) REFERENCES groups(id) ON DELETE CASCADE,
        FOREIGN KEY(agent_id) REFERENCES users(id) ON DELETE CASCADE
    );

    -- FX rates: 1 base = rate quote, per day
    CREATE TABLE IF NOT EXISTS fx_rates(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        date TEXT NOT NULL,
        base TEXT NOT NULL,
        quote TEXT NOT NULL,
        rate TEXT NOT NULL,
        UNIQUE(date, base, quote)
    );
    "#,
    )?;
    Ok(())
}

/// Ensures exactly one admin exists; returns the id of a newly created one.
pub fn bootstrap_admin(conn: &Connection, cfg: &AppConfig) -> Result<Option<i64>> {
    let admins: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE lower(role)='admin'",
        [],
        |r| r.get(0),
    )?;
    if admins > 0 {
        return Ok(None);
    }
    let hash = registry::hash_password(&cfg.admin_password)?;
    conn.execute(
        "INSERT INTO users(name, email, password, role) VALUES (?1, ?2, ?3, ?4)",
        params![cfg.admin_name, cfg.admin_email, hash, Role::Admin.as_str()],
    )?;
    let id = conn.last_insert_rowid();
    info!(id, email = %cfg.admin_email, "bootstrapped admin user");
    Ok(Some(id))
}

/// Read a TEXT column holding a decimal.
pub fn decimal_at(r: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let s: String = r.get(idx)?;
    s.trim().parse::<Decimal>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub fn opt_decimal_at(r: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let s: Option<String> = r.get(idx)?;
    match s.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v.parse::<Decimal>().map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_creates_single_admin() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let cfg = AppConfig::default();
        assert!(bootstrap_admin(&conn, &cfg).unwrap().is_some());
        assert!(bootstrap_admin(&conn, &cfg).unwrap().is_none());
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM users WHERE role='admin'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn schema_is_idempotent_and_enforces_fks() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        let fk: i32 = conn
            .pragma_query_value(None, "foreign_keys", |r| r.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }
}
