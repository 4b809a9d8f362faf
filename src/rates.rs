// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Rate resolution.
//!
//! Two problems share the work-type map lookup here:
//! the authoritative bill rate from a group's configuration, which fails
//! loudly, and the agent commission rate, which degrades to zero.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

use crate::models::Source;

/// A configured rate: either one number, or one number per work type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rate {
    Scalar(Decimal),
    PerWorkType(BTreeMap<String, Decimal>),
}

impl Rate {
    /// Decode the JSON text stored in `users.rate` / `users.agent_rates`.
    ///
    /// Map keys are lowercased and entries that are not numeric are dropped.
    /// Anything that is neither a number nor an object decodes to `None`.
    pub fn from_db(raw: Option<&str>) -> Option<Rate> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            // Legacy rows may hold a bare unquoted number that JSON rejects.
            Err(_) => return parse_decimal_lenient(raw).map(Rate::Scalar),
        };
        match value {
            Value::Object(obj) => {
                let map = obj
                    .into_iter()
                    .filter_map(|(k, v)| {
                        let key = k.trim().to_lowercase();
                        if key.is_empty() {
                            return None;
                        }
                        json_to_decimal(&v).map(|d| (key, d))
                    })
                    .collect();
                Some(Rate::PerWorkType(map))
            }
            other => json_to_decimal(&other).map(Rate::Scalar),
        }
    }

    /// Encode for storage; the inverse of [`Rate::from_db`].
    pub fn to_db(&self) -> String {
        match self {
            Rate::Scalar(d) => decimal_to_json(*d).to_string(),
            Rate::PerWorkType(map) => {
                let obj: serde_json::Map<String, Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), decimal_to_json(*v)))
                    .collect();
                Value::Object(obj).to_string()
            }
        }
    }

    /// Parse operator input: `5`, `Claimer=5,Depositer=3`, or a JSON object.
    pub fn parse_cli(input: &str) -> Option<Rate> {
        let s = input.trim();
        if s.is_empty() {
            return None;
        }
        if s.starts_with('{') {
            return Rate::from_db(Some(s));
        }
        if !s.contains('=') {
            return parse_decimal_lenient(s).map(Rate::Scalar);
        }
        let mut map = BTreeMap::new();
        for pair in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (k, v) = pair.split_once('=')?;
            let key = k.trim().to_lowercase();
            let val = parse_decimal_lenient(v)?;
            if key.is_empty() {
                return None;
            }
            map.insert(key, val);
        }
        Some(Rate::PerWorkType(map))
    }

    /// Usable work-type entries, or `None` for a scalar or an empty map.
    fn usable_map(&self) -> Option<&BTreeMap<String, Decimal>> {
        match self {
            Rate::PerWorkType(map) if !map.is_empty() => Some(map),
            _ => None,
        }
    }
}

fn json_to_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => parse_decimal_lenient(&n.to_string()),
        Value::String(s) => parse_decimal_lenient(s),
        _ => None,
    }
}

fn decimal_to_json(d: Decimal) -> Value {
    let s = d.normalize().to_string();
    match serde_json::Number::from_str(&s) {
        Ok(n) => Value::Number(n),
        Err(_) => Value::String(s),
    }
}

/// Accepts plain and scientific notation.
pub fn parse_decimal_lenient(s: &str) -> Option<Decimal> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateError {
    #[error("Bank is required for a group without a same rate")]
    BankRequired,
    #[error("Bank {bank_id} is not configured for group {group_id}")]
    BankNotConfigured { group_id: i64, bank_id: i64 },
    #[error("Rate {0} must be greater than zero")]
    NotPositive(Decimal),
}

/// Resolve the client-facing bill rate from group configuration.
///
/// A group's `same_rate` wins over any per-bank rate regardless of bank.
/// Without it, a bank is required and `bank_rate` must know the pair.
pub fn resolve_bill_rate<F>(
    group_id: i64,
    same_rate: Option<Decimal>,
    bank_id: Option<i64>,
    bank_rate: F,
) -> Result<Decimal, RateError>
where
    F: FnOnce(i64) -> Option<Decimal>,
{
    let rate = match same_rate {
        Some(r) => r,
        None => {
            let bank_id = bank_id.ok_or(RateError::BankRequired)?;
            bank_rate(bank_id).ok_or(RateError::BankNotConfigured { group_id, bank_id })?
        }
    };
    if rate <= Decimal::ZERO {
        return Err(RateError::NotPositive(rate));
    }
    Ok(rate)
}

/// Resolve an agent's commission rate for a bill source.
///
/// `agent_rates` is used exclusively when it has usable entries, otherwise
/// the generic `rate` map. Lookup tries the source keys, then `default`.
/// With no map at all a scalar `rate` applies. Unresolved means zero.
pub fn resolve_agent_rate(
    source: Source,
    agent_rates: Option<&Rate>,
    rate: Option<&Rate>,
) -> Decimal {
    let map = agent_rates
        .and_then(Rate::usable_map)
        .or_else(|| rate.and_then(Rate::usable_map));

    match map {
        Some(map) => source
            .rate_keys()
            .iter()
            .chain(std::iter::once(&"default"))
            .find_map(|k| map.get(*k).copied())
            .unwrap_or(Decimal::ZERO),
        None => match rate {
            Some(Rate::Scalar(d)) => *d,
            _ => Decimal::ZERO,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn same_rate_wins_for_any_bank() {
        for bank in [None, Some(1), Some(2)] {
            let r = resolve_bill_rate(1, Some(dec("10")), bank, |_| Some(dec("7.5"))).unwrap();
            assert_eq!(r, dec("10"));
        }
    }

    #[test]
    fn per_bank_requires_bank() {
        let err = resolve_bill_rate(1, None, None, |_| Some(dec("7.5"))).unwrap_err();
        assert_eq!(err, RateError::BankRequired);
    }

    #[test]
    fn per_bank_missing_pair_errors() {
        let err = resolve_bill_rate(4, None, Some(9), |_| None).unwrap_err();
        assert_eq!(
            err,
            RateError::BankNotConfigured {
                group_id: 4,
                bank_id: 9
            }
        );
    }

    #[test]
    fn per_bank_uses_configured_rate() {
        let r = resolve_bill_rate(1, None, Some(2), |b| (b == 2).then(|| dec("7.5"))).unwrap();
        assert_eq!(r, dec("7.5"));
    }

    #[test]
    fn zero_rate_rejected() {
        let err = resolve_bill_rate(1, Some(Decimal::ZERO), None, |_| None).unwrap_err();
        assert!(matches!(err, RateError::NotPositive(_)));
    }

    #[test]
    fn generic_rate_used_when_agent_rates_empty() {
        let agent = Rate::from_db(Some("{}"));
        let generic = Rate::from_db(Some(r#"{"Claimer": 5}"#));
        assert_eq!(
            resolve_agent_rate(Source::Claim, agent.as_ref(), generic.as_ref()),
            dec("5")
        );
        assert_eq!(
            resolve_agent_rate(Source::Depo, agent.as_ref(), generic.as_ref()),
            Decimal::ZERO
        );
    }

    #[test]
    fn agent_rates_are_exclusive() {
        let agent = Rate::parse_cli("Depositer=2");
        let generic = Rate::parse_cli("Claimer=5");
        // No merge: claimer is absent from agent_rates and there is no default.
        assert_eq!(
            resolve_agent_rate(Source::Claim, agent.as_ref(), generic.as_ref()),
            Decimal::ZERO
        );
        assert_eq!(
            resolve_agent_rate(Source::Depo, agent.as_ref(), generic.as_ref()),
            dec("2")
        );
    }

    #[test]
    fn alternate_spelling_then_default() {
        let r = Rate::parse_cli("depositor=3,default=1");
        assert_eq!(resolve_agent_rate(Source::Depo, r.as_ref(), None), dec("3"));
        assert_eq!(resolve_agent_rate(Source::Claim, r.as_ref(), None), dec("1"));
    }

    #[test]
    fn bare_scalar_rate_fallback() {
        let generic = Rate::from_db(Some("1.5"));
        assert_eq!(
            resolve_agent_rate(Source::Claim, None, generic.as_ref()),
            dec("1.5")
        );
    }

    #[test]
    fn non_numeric_entries_are_unusable() {
        let agent = Rate::from_db(Some(r#"{"claimer": "abc", "x": null}"#));
        let generic = Rate::from_db(Some(r#"{"claimer": 4}"#));
        assert_eq!(
            resolve_agent_rate(Source::Claim, agent.as_ref(), generic.as_ref()),
            dec("4")
        );
    }

    #[test]
    fn db_codec_normalizes_keys() {
        let r = Rate::from_db(Some(r#"{" Claimer ": "1.20"}"#)).unwrap();
        assert_eq!(r.to_db(), r#"{"claimer":1.2}"#);
        assert_eq!(Rate::from_db(Some("\"3\"")), Some(Rate::Scalar(dec("3"))));
        assert_eq!(Rate::from_db(Some("")), None);
        assert_eq!(Rate::from_db(Some("[1,2]")), None);
    }

    #[test]
    fn cli_parse_rejects_garbage() {
        assert!(Rate::parse_cli("Claimer=abc").is_none());
        assert!(Rate::parse_cli("=4").is_none());
        assert_eq!(Rate::parse_cli("7"), Some(Rate::Scalar(dec("7"))));
    }
}
