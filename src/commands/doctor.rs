// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::utils::pretty_table;
use anyhow::Result;
use rusqlite::Connection;

/// Each check is an issue label and a query yielding one detail per row.
const CHECKS: &[(&str, &str)] = &[
    (
        "missing_agent_bill",
        "SELECT 'bill ' || b.id || ' (' || g.name || ')'
         FROM bill b JOIN groups g ON g.id = b.group_id
         LEFT JOIN agent_bill ab ON ab.bill_id = b.id
         WHERE g.type IN ('Claim', 'Depo') AND ab.id IS NULL
         ORDER BY b.id",
    ),
    (
        "stale_agent_bill",
        "SELECT 'bill ' || ab.bill_id || ' (' || g.name || ' is ' || g.type || ')'
         FROM agent_bill ab JOIN groups g ON g.id = ab.group_id
         WHERE g.type NOT IN ('Claim', 'Depo')
         ORDER BY ab.bill_id",
    ),
    (
        "agent_bill_drift",
        "SELECT 'bill ' || b.id
         FROM agent_bill ab JOIN bill b ON b.id = ab.bill_id
         WHERE ab.amount != b.amount OR ab.agent_id != b.agent_id
            OR ab.group_id != b.group_id OR ab.bill_date != b.bill_date
         ORDER BY b.id",
    ),
    (
        "duplicate_agent_name",
        "SELECT lower(trim(name)) || ' x' || COUNT(*)
         FROM users WHERE lower(role) = 'agent'
         GROUP BY lower(trim(name)) HAVING COUNT(*) > 1",
    ),
    (
        "unresolved_bill_rate",
        "SELECT 'bill ' || b.id || ' (' || g.name || ')'
         FROM bill b JOIN groups g ON g.id = b.group_id
         LEFT JOIN group_bank_rate gbr ON gbr.group_id = b.group_id AND gbr.bank_id = b.bank_id
         WHERE b.rate IS NULL AND g.same_rate IS NULL AND gbr.id IS NULL
         ORDER BY b.id",
    ),
    (
        "group_without_rates",
        "SELECT g.name FROM groups g
         WHERE g.same_rate IS NULL
           AND NOT EXISTS (SELECT 1 FROM group_bank_rate r WHERE r.group_id = g.id)
         ORDER BY g.name",
    ),
];

pub fn handle(conn: &Connection) -> Result<()> {
    let rows = find_issues(conn)?;
    if rows.is_empty() {
        println!("doctor: no issues found");
    } else {
        println!("{}", pretty_table(&["Issue", "Detail"], rows));
    }
    Ok(())
}

pub fn find_issues(conn: &Connection) -> Result<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    for (label, sql) in CHECKS {
        let mut stmt = conn.prepare(sql)?;
        let mut cur = stmt.query([])?;
        while let Some(r) = cur.next()? {
            let detail: String = r.get(0)?;
            rows.push(vec![label.to_string(), detail]);
        }
    }
    Ok(rows)
}
