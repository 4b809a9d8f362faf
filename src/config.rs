// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Runtime configuration loaded from environment variables.
//!
//! Every setting has a default so `billdesk init` works with zero setup.

use std::path::PathBuf;

pub const DEFAULT_FX_URL: &str = "https://api.frankfurter.dev";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database file. Env: `BILLDESK_DB`. Default: platform data dir.
    pub db_path: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset. Env: `BILLDESK_LOG`.
    pub log_filter: String,

    /// Bootstrap admin account, created only when no admin exists.
    /// Env: `BILLDESK_ADMIN_NAME`, `BILLDESK_ADMIN_EMAIL`, `BILLDESK_ADMIN_PASSWORD`.
    pub admin_name: String,
    pub admin_email: String,
    pub admin_password: String,

    /// Exchange-rate API base URL. Env: `BILLDESK_FX_URL`.
    pub fx_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            log_filter: "warn".to_string(),
            admin_name: "Administrator".to_string(),
            admin_email: "admin@billdesk.local".to_string(),
            admin_password: "admin123".to_string(),
            fx_url: DEFAULT_FX_URL.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let d = Self::default();
        Self {
            db_path: get("BILLDESK_DB").map(PathBuf::from),
            log_filter: get("BILLDESK_LOG").unwrap_or(d.log_filter),
            admin_name: get("BILLDESK_ADMIN_NAME").unwrap_or(d.admin_name),
            admin_email: get("BILLDESK_ADMIN_EMAIL").unwrap_or(d.admin_email),
            admin_password: get("BILLDESK_ADMIN_PASSWORD").unwrap_or(d.admin_password),
            fx_url: get("BILLDESK_FX_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(d.fx_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_unset() {
        let cfg = AppConfig::from_lookup(|_| None);
        assert!(cfg.db_path.is_none());
        assert_eq!(cfg.log_filter, "warn");
        assert_eq!(cfg.fx_url, DEFAULT_FX_URL);
    }

    #[test]
    fn overrides_and_blank_values() {
        let env: HashMap<&str, &str> = [
            ("BILLDESK_DB", "/tmp/b.sqlite"),
            ("BILLDESK_ADMIN_EMAIL", "  "),
            ("BILLDESK_FX_URL", "http://localhost:9000/"),
        ]
        .into_iter()
        .collect();
        let cfg = AppConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.db_path, Some(PathBuf::from("/tmp/b.sqlite")));
        assert_eq!(cfg.admin_email, "admin@billdesk.local");
        assert_eq!(cfg.fx_url, "http://localhost:9000");
    }
}
