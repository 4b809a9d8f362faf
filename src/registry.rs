// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Reference data: banks, groups, their per-bank rates, and users.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use tracing::info;

use crate::db::{decimal_at, opt_decimal_at};
use crate::error::{BillingError, Result};
use crate::models::{Bank, Group, GroupBankRate, GroupType, Role, User};
use crate::rates::Rate;
use crate::utils::{is_valid_email, is_valid_phone};

pub fn hash_password(password: &str) -> Result<String> {
    if password.is_empty() {
        return Err(BillingError::validation("Password is required"));
    }
    let salt_bytes: [u8; 16] = rand::random();
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| BillingError::Internal(format!("salt encoding failed: {}", e)))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| BillingError::Internal(format!("password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Checks a plaintext password against a stored argon2 hash.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// ---- banks ----

pub fn create_bank(conn: &Connection, name: &str) -> Result<Bank> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BillingError::validation("Bank name is required"));
    }
    conn.execute("INSERT INTO banks(bank_name) VALUES (?1)", params![name])?;
    let id = conn.last_insert_rowid();
    info!(id, bank = name, "bank created");
    Ok(Bank {
        id,
        bank_name: name.to_string(),
    })
}

pub fn list_banks(conn: &Connection) -> Result<Vec<Bank>> {
    let mut stmt = conn.prepare("SELECT id, bank_name FROM banks ORDER BY bank_name")?;
    let rows = stmt.query_map([], |r| {
        Ok(Bank {
            id: r.get(0)?,
            bank_name: r.get(1)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn delete_bank(conn: &Connection, id: i64) -> Result<()> {
    let n = conn.execute("DELETE FROM banks WHERE id=?1", params![id])?;
    if n == 0 {
        return Err(BillingError::not_found(format!("Bank {} not found", id)));
    }
    Ok(())
}

// ---- groups ----

#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    pub group_type: GroupType,
    pub owner: i64,
    pub same_rate: Option<Decimal>,
}

fn group_from_row(r: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: r.get(0)?,
        name: r.get(1)?,
        r#type: r.get(2)?,
        owner: r.get(3)?,
        same_rate: opt_decimal_at(r, 4)?,
    })
}

const GROUP_COLS: &str = "id, name, type, owner, same_rate";

fn check_positive_rate(rate: Decimal) -> Result<()> {
    if rate <= Decimal::ZERO {
        return Err(BillingError::validation(format!(
            "Rate {} must be greater than zero",
            rate
        )));
    }
    Ok(())
}

pub fn create_group(conn: &Connection, g: &NewGroup) -> Result<Group> {
    let name = g.name.trim();
    if name.is_empty() {
        return Err(BillingError::validation("Group name is required"));
    }
    let owner = get_user(conn, g.owner)?;
    if !owner.has_role(Role::Client) {
        return Err(BillingError::validation(format!(
            "Group owner '{}' must have role Client",
            owner.name
        )));
    }
    if let Some(r) = g.same_rate {
        check_positive_rate(r)?;
    }
    conn.execute(
        "INSERT INTO groups(name, type, owner, same_rate) VALUES (?1, ?2, ?3, ?4)",
        params![
            name,
            g.group_type.as_str(),
            g.owner,
            g.same_rate.map(|r| r.to_string())
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(id, group = name, kind = g.group_type.as_str(), "group created");
    get_group(conn, id)
}

pub fn get_group(conn: &Connection, id: i64) -> Result<Group> {
    conn.query_row(
        &format!("SELECT {} FROM groups WHERE id=?1", GROUP_COLS),
        params![id],
        group_from_row,
    )
    .optional()?
    .ok_or_else(|| BillingError::not_found(format!("Group {} not found", id)))
}

pub fn list_groups(conn: &Connection) -> Result<Vec<Group>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM groups ORDER BY name", GROUP_COLS))?;
    let rows = stmt.query_map([], group_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Existing agent bills keep their snapshot until their bill is next written.
pub fn set_group_type(conn: &Connection, id: i64, group_type: GroupType) -> Result<()> {
    let n = conn.execute(
        "UPDATE groups SET type=?1 WHERE id=?2",
        params![group_type.as_str(), id],
    )?;
    if n == 0 {
        return Err(BillingError::not_found(format!("Group {} not found", id)));
    }
    Ok(())
}

pub fn set_same_rate(conn: &Connection, id: i64, same_rate: Option<Decimal>) -> Result<()> {
    if let Some(r) = same_rate {
        check_positive_rate(r)?;
    }
    let n = conn.execute(
        "UPDATE groups SET same_rate=?1 WHERE id=?2",
        params![same_rate.map(|r| r.to_string()), id],
    )?;
    if n == 0 {
        return Err(BillingError::not_found(format!("Group {} not found", id)));
    }
    Ok(())
}

/// Insert or replace the rate for a `(group, bank)` pair.
pub fn upsert_group_bank_rate(
    conn: &Connection,
    group_id: i64,
    bank_id: i64,
    rate: Decimal,
) -> Result<GroupBankRate> {
    check_positive_rate(rate)?;
    conn.execute(
        "INSERT INTO group_bank_rate(group_id, bank_id, rate) VALUES (?1, ?2, ?3)
         ON CONFLICT(group_id, bank_id) DO UPDATE SET rate=excluded.rate",
        params![group_id, bank_id, rate.to_string()],
    )?;
    Ok(GroupBankRate {
        group_id,
        bank_id,
        rate,
    })
}

pub fn group_bank_rate(conn: &Connection, group_id: i64, bank_id: i64) -> Result<Option<Decimal>> {
    Ok(conn
        .query_row(
            "SELECT rate FROM group_bank_rate WHERE group_id=?1 AND bank_id=?2",
            params![group_id, bank_id],
            |r| decimal_at(r, 0),
        )
        .optional()?)
}

pub fn list_group_bank_rates(conn: &Connection, group_id: Option<i64>) -> Result<Vec<GroupBankRate>> {
    let mut stmt = conn.prepare(
        "SELECT group_id, bank_id, rate FROM group_bank_rate
         WHERE ?1 IS NULL OR group_id=?1 ORDER BY group_id, bank_id",
    )?;
    let rows = stmt.query_map(params![group_id], |r| {
        Ok(GroupBankRate {
            group_id: r.get(0)?,
            bank_id: r.get(1)?,
            rate: decimal_at(r, 2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn delete_group(conn: &Connection, id: i64) -> Result<()> {
    let n = conn.execute("DELETE FROM groups WHERE id=?1", params![id])?;
    if n == 0 {
        return Err(BillingError::not_found(format!("Group {} not found", id)));
    }
    Ok(())
}

// ---- users ----

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub phone: Option<String>,
    pub worktype: Option<String>,
    pub rate: Option<Rate>,
    pub agent_rates: Option<Rate>,
}

const USER_COLS: &str = "id, name, email, password, role, phone, worktype, rate, agent_rates";

fn user_from_row(r: &Row<'_>) -> rusqlite::Result<User> {
    let rate: Option<String> = r.get(7)?;
    let agent_rates: Option<String> = r.get(8)?;
    Ok(User {
        id: r.get(0)?,
        name: r.get(1)?,
        email: r.get(2)?,
        password: r.get(3)?,
        role: r.get(4)?,
        phone: r.get(5)?,
        worktype: r.get(6)?,
        rate: Rate::from_db(rate.as_deref()),
        agent_rates: Rate::from_db(agent_rates.as_deref()),
    })
}

pub fn create_user(conn: &Connection, u: &NewUser) -> Result<User> {
    let name = u.name.trim();
    let email = u.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(BillingError::validation("Name is required"));
    }
    if !is_valid_email(&email) {
        return Err(BillingError::validation(format!("Invalid email '{}'", u.email)));
    }
    let phone = u
        .phone
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty());
    if let Some(p) = phone {
        if !is_valid_phone(p) {
            return Err(BillingError::validation(format!("Invalid phone '{}'", p)));
        }
    }
    if u.role == Role::Admin {
        return Err(BillingError::validation(
            "Only the bootstrapped admin may hold role admin",
        ));
    }
    let worktype = u
        .worktype
        .as_deref()
        .map(|w| {
            w.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(",")
        })
        .filter(|w| !w.is_empty());
    let hash = hash_password(&u.password)?;
    conn.execute(
        "INSERT INTO users(name, email, password, phone, worktype, role, rate, agent_rates)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            name,
            email,
            hash,
            phone,
            worktype,
            u.role.as_str(),
            u.rate.as_ref().map(Rate::to_db),
            u.agent_rates.as_ref().map(Rate::to_db)
        ],
    )?;
    let id = conn.last_insert_rowid();
    info!(id, role = u.role.as_str(), "user created");
    get_user(conn, id)
}

pub fn get_user(conn: &Connection, id: i64) -> Result<User> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id=?1", USER_COLS),
        params![id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| BillingError::not_found(format!("User {} not found", id)))
}

pub fn list_users(conn: &Connection, role: Option<Role>) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users WHERE ?1 IS NULL OR lower(role)=lower(?1) ORDER BY name, id",
        USER_COLS
    ))?;
    let rows = stmt.query_map(params![role.map(|r| r.as_str())], user_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Replace whichever rate maps are given; `None` leaves a map untouched.
pub fn set_user_rates(
    conn: &Connection,
    id: i64,
    rate: Option<&Rate>,
    agent_rates: Option<&Rate>,
) -> Result<()> {
    get_user(conn, id)?;
    if let Some(r) = rate {
        conn.execute(
            "UPDATE users SET rate=?1 WHERE id=?2",
            params![r.to_db(), id],
        )?;
    }
    if let Some(r) = agent_rates {
        conn.execute(
            "UPDATE users SET agent_rates=?1 WHERE id=?2",
            params![r.to_db(), id],
        )?;
    }
    Ok(())
}

pub fn set_password(conn: &Connection, id: i64, password: &str) -> Result<()> {
    let hash = hash_password(password)?;
    let n = conn.execute(
        "UPDATE users SET password=?1 WHERE id=?2",
        params![hash, id],
    )?;
    if n == 0 {
        return Err(BillingError::not_found(format!("User {} not found", id)));
    }
    Ok(())
}

pub fn delete_user(conn: &Connection, id: i64) -> Result<()> {
    let user = get_user(conn, id)?;
    if user.has_role(Role::Admin) {
        return Err(BillingError::validation("The admin user cannot be deleted"));
    }
    conn.execute("DELETE FROM users WHERE id=?1", params![id])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;

    fn conn() -> Connection {
        let c = Connection::open_in_memory().unwrap();
        init_schema(&c).unwrap();
        c
    }

    fn user(role: Role, email: &str) -> NewUser {
        NewUser {
            name: "Someone".into(),
            email: email.into(),
            password: "secret".into(),
            role,
            phone: None,
            worktype: None,
            rate: None,
            agent_rates: None,
        }
    }

    #[test]
    fn password_is_hashed_and_verifiable() {
        let c = conn();
        let u = create_user(&c, &user(Role::Agent, "a@x.io")).unwrap();
        assert!(u.password.starts_with("$argon2"));
        assert!(verify_password("secret", &u.password));
        assert!(!verify_password("wrong", &u.password));
    }

    #[test]
    fn duplicate_email_conflicts() {
        let c = conn();
        create_user(&c, &user(Role::Agent, "a@x.io")).unwrap();
        let err = create_user(&c, &user(Role::Client, "A@x.io")).unwrap_err();
        assert!(matches!(err, BillingError::Conflict(_)));
    }

    #[test]
    fn invalid_phone_rejected() {
        let c = conn();
        let mut u = user(Role::Agent, "a@x.io");
        u.phone = Some("call me".into());
        let err = create_user(&c, &u).unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
    }

    #[test]
    fn group_owner_must_be_client() {
        let c = conn();
        let agent = create_user(&c, &user(Role::Agent, "a@x.io")).unwrap();
        let err = create_group(
            &c,
            &NewGroup {
                name: "G".into(),
                group_type: GroupType::Claim,
                owner: agent.id,
                same_rate: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("must have role Client"));
    }

    #[test]
    fn bank_rate_upsert_replaces() {
        let c = conn();
        let client = create_user(&c, &user(Role::Client, "c@x.io")).unwrap();
        let g = create_group(
            &c,
            &NewGroup {
                name: "G".into(),
                group_type: GroupType::Depo,
                owner: client.id,
                same_rate: None,
            },
        )
        .unwrap();
        let b = create_bank(&c, "HDFC").unwrap();
        upsert_group_bank_rate(&c, g.id, b.id, Decimal::new(75, 1)).unwrap();
        upsert_group_bank_rate(&c, g.id, b.id, Decimal::new(8, 0)).unwrap();
        assert_eq!(list_group_bank_rates(&c, Some(g.id)).unwrap().len(), 1);
        assert_eq!(
            group_bank_rate(&c, g.id, b.id).unwrap(),
            Some(Decimal::new(8, 0))
        );
    }
}
