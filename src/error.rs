// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::rates::RateError;

/// Errors produced by the billing core.
#[derive(Error, Debug)]
pub enum BillingError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// Referenced record does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate unique key.
    #[error("{0}")]
    Conflict(String),

    /// Authoritative bill rate could not be resolved.
    #[error(transparent)]
    Rate(#[from] RateError),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BillingError>;

impl BillingError {
    pub fn validation(msg: impl Into<String>) -> Self {
        BillingError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        BillingError::NotFound(msg.into())
    }

    /// HTTP-equivalent status for this error kind.
    pub fn status(&self) -> u16 {
        match self {
            BillingError::Validation(_) | BillingError::Rate(_) | BillingError::Csv(_) => 400,
            BillingError::NotFound(_) => 404,
            BillingError::Conflict(_) => 409,
            _ => 500,
        }
    }

    /// Process exit code used by the CLI boundary.
    pub fn exit_code(&self) -> u8 {
        match self.status() {
            400 => 2,
            404 => 3,
            409 => 4,
            _ => 1,
        }
    }
}

impl From<rusqlite::Error> for BillingError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, msg) = &err {
            if code.code == ErrorCode::ConstraintViolation {
                let detail = msg.clone().unwrap_or_default();
                if detail.contains("UNIQUE") {
                    return BillingError::Conflict(describe_unique(&detail));
                }
                if detail.contains("FOREIGN KEY") {
                    return BillingError::Validation(
                        "Referenced record does not exist".to_string(),
                    );
                }
            }
        }
        BillingError::Database(err)
    }
}

// SQLite reports e.g. "UNIQUE constraint failed: banks.bank_name".
fn describe_unique(detail: &str) -> String {
    let cols = detail
        .split_once(':')
        .map(|(_, c)| c.trim())
        .unwrap_or_default();
    match cols {
        "users.email" => "Email already exists".to_string(),
        "banks.bank_name" => "Bank name already exists".to_string(),
        "group_bank_rate.group_id, group_bank_rate.bank_id" => {
            "Rate for this group and bank already exists".to_string()
        }
        "" => "Duplicate record".to_string(),
        other => format!("Duplicate value for {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_maps_to_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE banks(id INTEGER PRIMARY KEY, bank_name TEXT UNIQUE);")
            .unwrap();
        conn.execute("INSERT INTO banks(bank_name) VALUES ('HDFC')", [])
            .unwrap();
        let err: BillingError = conn
            .execute("INSERT INTO banks(bank_name) VALUES ('HDFC')", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, BillingError::Conflict(_)));
        assert_eq!(err.to_string(), "Bank name already exists");
        assert_eq!(err.status(), 409);
    }

    #[test]
    fn other_errors_are_internal() {
        let err = BillingError::Internal("boom".into());
        assert_eq!(err.status(), 500);
        assert_eq!(err.exit_code(), 1);
        assert_eq!(BillingError::not_found("x").exit_code(), 3);
    }
}
