// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::rates::Rate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    Client,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "Client",
            Role::Agent => "Agent",
        }
    }

    /// Case-insensitive; stored roles are canonicalised on write.
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "client" => Some(Role::Client),
            "agent" => Some(Role::Agent),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupType {
    Claim,
    Depo,
    Processing,
    Payment,
}

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupType::Claim => "Claim",
            GroupType::Depo => "Depo",
            GroupType::Processing => "Processing",
            GroupType::Payment => "Payment",
        }
    }

    pub fn parse(s: &str) -> Option<GroupType> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claim" => Some(GroupType::Claim),
            "depo" => Some(GroupType::Depo),
            "processing" => Some(GroupType::Processing),
            "payment" => Some(GroupType::Payment),
            _ => None,
        }
    }
}

/// Commission source of a bill, derived from its group's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    Claim,
    Depo,
}

impl Source {
    /// Only `Claim` and `Depo` groups are commissionable.
    pub fn from_group_type(group_type: &str) -> Option<Source> {
        match group_type.trim().to_ascii_lowercase().as_str() {
            "claim" => Some(Source::Claim),
            "depo" => Some(Source::Depo),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Claim => "Claim",
            Source::Depo => "Depo",
        }
    }

    /// Work-type keys tried, in order, before the `default` key.
    pub fn rate_keys(&self) -> &'static [&'static str] {
        match self {
            Source::Claim => &["claimer"],
            Source::Depo => &["depositer", "depositor"],
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bank {
    pub id: i64,
    pub bank_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub r#type: String,
    pub owner: i64,
    pub same_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupBankRate {
    pub group_id: i64,
    pub bank_id: i64,
    pub rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub role: String,
    pub phone: Option<String>,
    pub worktype: Option<String>,
    pub rate: Option<Rate>,
    pub agent_rates: Option<Rate>,
}

impl User {
    pub fn has_role(&self, role: Role) -> bool {
        Role::parse(&self.role) == Some(role)
    }

    pub fn worktypes(&self) -> Vec<String> {
        self.worktype
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: i64,
    pub bill_date: NaiveDate,
    pub group_id: i64,
    pub bank_id: Option<i64>,
    pub client_id: i64,
    pub agent_id: i64,
    pub amount: Decimal,
    pub rate: Option<Decimal>,
}

/// Commission snapshot of a bill, refreshed only when the bill is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentBill {
    pub bill_id: i64,
    pub bill_date: NaiveDate,
    pub group_id: i64,
    pub client_id: i64,
    pub agent_id: i64,
    pub source: Source,
    pub bank_id: Option<i64>,
    pub amount: Decimal,
    pub rate: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtherBillKind {
    Client,
    Agent,
}

impl OtherBillKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtherBillKind::Client => "client",
            OtherBillKind::Agent => "agent",
        }
    }

    pub fn parse(s: &str) -> Option<OtherBillKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Some(OtherBillKind::Client),
            "agent" => Some(OtherBillKind::Agent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtherBill {
    pub id: i64,
    pub bill_date: NaiveDate,
    pub kind: OtherBillKind,
    pub client_id: Option<i64>,
    pub group_id: Option<i64>,
    pub agent_id: Option<i64>,
    pub amount: Decimal,
    pub description: Option<String>,
}
