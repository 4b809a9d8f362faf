// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Bulk bill upload.
//!
//! A sheet is validated row by row against lookup tables built once per
//! upload. Every problem in every row is collected; bills are inserted only
//! when no row failed, and then all of them in one transaction.

use calamine::{Data, Reader, open_workbook_auto};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, Trim};
use rusqlite::Connection;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::agent_bill::sync_agent_bill;
use crate::bill::{BillInput, insert_bill};
use crate::error::{BillingError, Result};
use crate::models::{Bank, Group, Role, Source, User};
use crate::rates::{RateError, parse_decimal_lenient, resolve_bill_rate};
use crate::registry::{list_banks, list_group_bank_rates, list_groups, list_users};
use crate::utils::normalize_key;

pub const REQUIRED_COLUMNS: [&str; 6] = ["Date", "Group", "Agent", "Bank", "Amount", "Total"];

/// One decoded spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl CellValue {
    pub fn text(s: &str) -> CellValue {
        let s = s.trim().trim_start_matches('\u{feff}');
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(s.to_string())
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
            CellValue::Date(d) => d.to_string(),
        }
    }
}

pub type Matrix = Vec<Vec<CellValue>>;

/// Read an uploaded file into cells: CSV as text, workbooks from their first sheet.
pub fn read_matrix(path: &Path) -> Result<Matrix> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "" | "csv" | "txt" => {
            let f = std::fs::File::open(path)?;
            read_csv_matrix(f)
        }
        "xls" | "xlsx" | "xlsm" | "xlsb" | "ods" => read_workbook_matrix(path),
        other => Err(BillingError::validation(format!(
            "Unsupported file type '.{}'",
            other
        ))),
    }
}

pub fn read_csv_matrix<R: Read>(rdr: R) -> Result<Matrix> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(rdr);
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        out.push(rec.iter().map(CellValue::text).collect());
    }
    Ok(out)
}

fn cell_from_data(d: &Data) -> CellValue {
    match d {
        Data::Empty => CellValue::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::text(s),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => match excel_serial_to_date(dt.as_f64()) {
            Some(date) => CellValue::Date(date),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

/// Decode the first worksheet of an Excel or OpenDocument workbook.
pub fn read_workbook_matrix(path: &Path) -> Result<Matrix> {
    let mut wb = open_workbook_auto(path)
        .map_err(|e| BillingError::validation(format!("Cannot read workbook: {}", e)))?;
    let Some(first) = wb.sheet_names().first().cloned() else {
        return Err(BillingError::validation("No sheet found in file"));
    };
    let range = wb
        .worksheet_range(&first)
        .map_err(|e| BillingError::validation(format!("Cannot read sheet '{}': {}", first, e)))?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect())
}

// Excel's day zero, accounting for its fictitious 1900-02-29.
fn excel_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !(1.0..2_958_466.0).contains(&serial) {
        return None;
    }
    excel_epoch().checked_add_signed(Duration::days(serial.floor() as i64))
}

const DATE_FORMATS: [&str; 10] = [
    "%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d", "%d.%m.%Y", "%d %b %Y", "%d-%b-%Y",
    "%b %d, %Y", "%B %d, %Y", "%d %B %Y",
];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

fn parse_date_text(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(n) = s.parse::<f64>() {
        return excel_serial_to_date(n);
    }
    if let Some(d) = DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
    {
        return Some(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .map(|dt| dt.date())
}

/// Native dates, Excel serials, ISO, `DD-MM-YYYY`, `DD/MM/YYYY`, and a few
/// other common spellings.
pub fn parse_date_cell(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::Date(d) => Some(*d),
        CellValue::Number(n) => excel_serial_to_date(*n),
        CellValue::Text(s) => parse_date_text(s),
        CellValue::Empty => None,
    }
}

fn parse_money_cell(cell: &CellValue) -> Option<Decimal> {
    match cell {
        CellValue::Number(n) if n.is_finite() => parse_decimal_lenient(&n.to_string()),
        CellValue::Text(s) => {
            let cleaned: String = s.trim().trim_start_matches('$').replace(',', "");
            parse_decimal_lenient(&cleaned)
        }
        _ => None,
    }
}

fn is_blank_bank(raw: &str) -> bool {
    let t = raw.trim();
    t.is_empty() || t == "-" || t.eq_ignore_ascii_case("n/a")
}

fn round2(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Rounded totals may differ by at most one cent.
pub fn total_matches(expected: Decimal, received: Decimal) -> bool {
    (round2(expected) - round2(received)).abs() <= Decimal::new(1, 2)
}

struct Columns {
    headers: Vec<String>,
    date: usize,
    group: usize,
    agent: usize,
    bank: usize,
    amount: usize,
    total: usize,
}

fn header_key(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn resolve_columns(header: &[CellValue]) -> Result<Columns> {
    let headers: Vec<String> = header.iter().map(CellValue::display).collect();
    let keys: Vec<String> = headers.iter().map(|h| header_key(h)).collect();
    let find = |name: &str| keys.iter().position(|k| *k == header_key(name));

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| find(*c).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(BillingError::validation(format!(
            "Missing required columns: {}",
            missing.join(", ")
        )));
    }
    let idx = |name: &str| find(name).unwrap_or_default();
    Ok(Columns {
        date: idx("Date"),
        group: idx("Group"),
        agent: idx("Agent"),
        bank: idx("Bank"),
        amount: idx("Amount"),
        total: idx("Total"),
        headers,
    })
}

/// Request-scoped indices over reference data.
pub struct Lookups {
    groups: HashMap<String, Vec<Group>>,
    users: HashMap<i64, User>,
    agents: HashMap<String, Vec<i64>>,
    banks: HashMap<String, Bank>,
    bank_rates: HashMap<(i64, i64), Decimal>,
}

impl Lookups {
    pub fn load(conn: &Connection) -> Result<Self> {
        let mut groups: HashMap<String, Vec<Group>> = HashMap::new();
        for g in list_groups(conn)? {
            groups.entry(normalize_key(&g.name)).or_default().push(g);
        }
        let mut users = HashMap::new();
        let mut agents: HashMap<String, Vec<i64>> = HashMap::new();
        for u in list_users(conn, None)? {
            if u.has_role(Role::Agent) {
                agents.entry(normalize_key(&u.name)).or_default().push(u.id);
            }
            users.insert(u.id, u);
        }
        let banks = list_banks(conn)?
            .into_iter()
            .map(|b| (normalize_key(&b.bank_name), b))
            .collect();
        let bank_rates = list_group_bank_rates(conn, None)?
            .into_iter()
            .map(|r| ((r.group_id, r.bank_id), r.rate))
            .collect();
        Ok(Self {
            groups,
            users,
            agents,
            banks,
            bank_rates,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowFailure {
    pub row_number: usize,
    pub errors: Vec<String>,
    /// Original cells by header, plus derived `Client`, `Source` and `Rate`.
    pub row: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkReport {
    pub total_rows: usize,
    pub failed_rows: usize,
    pub errors: Vec<RowFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSummary {
    pub total_rows: usize,
    pub inserted: usize,
    pub bill_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub enum BulkOutcome {
    Inserted(BulkSummary),
    Rejected(BulkReport),
}

fn validate_row(
    lk: &Lookups,
    cols: &Columns,
    cells: &[CellValue],
    row_number: usize,
) -> std::result::Result<BillInput, RowFailure> {
    let empty = CellValue::Empty;
    let cell = |i: usize| cells.get(i).unwrap_or(&empty);
    let mut errors: Vec<String> = Vec::new();

    // Date
    let date_cell = cell(cols.date);
    let bill_date = parse_date_cell(date_cell);
    if bill_date.is_none() {
        if date_cell.is_blank() {
            errors.push("Date is required".to_string());
        } else {
            errors.push(format!("Invalid date '{}'", date_cell.display()));
        }
    }

    // Group
    let group_raw = cell(cols.group).display();
    let group = if group_raw.is_empty() {
        errors.push("Group is required".to_string());
        None
    } else {
        match lk.groups.get(&normalize_key(&group_raw)).map(Vec::as_slice) {
            Some([g]) => Some(g),
            Some(gs) if gs.len() > 1 => {
                errors.push(format!(
                    "Multiple groups found with same name '{}'",
                    group_raw
                ));
                None
            }
            _ => {
                errors.push(format!("Group '{}' not found", group_raw));
                None
            }
        }
    };

    // Client is always the group's owner.
    let client = group.and_then(|g| match lk.users.get(&g.owner) {
        Some(u) if u.has_role(Role::Client) => Some(u),
        Some(u) => {
            errors.push(format!(
                "Owner '{}' of group '{}' is not a Client",
                u.name, g.name
            ));
            None
        }
        None => {
            errors.push(format!("Client for group '{}' not found", g.name));
            None
        }
    });

    // Agent
    let agent_raw = cell(cols.agent).display();
    let agent_id = if agent_raw.is_empty() {
        errors.push("Agent is required".to_string());
        None
    } else {
        match lk.agents.get(&normalize_key(&agent_raw)).map(Vec::as_slice) {
            Some([id]) => Some(*id),
            Some(ids) if ids.len() > 1 => {
                errors.push(format!(
                    "Multiple agents found with same name '{}'",
                    agent_raw
                ));
                None
            }
            _ => {
                errors.push(format!("Agent '{}' not found", agent_raw));
                None
            }
        }
    };

    // Source
    let source = group.and_then(|g| {
        let s = Source::from_group_type(&g.r#type);
        if s.is_none() {
            errors.push(format!(
                "Group '{}' has type '{}', expected Claim or Depo",
                g.name, g.r#type
            ));
        }
        s
    });

    // Amount
    let amount_cell = cell(cols.amount);
    let amount = parse_money_cell(amount_cell).filter(|a| *a > Decimal::ZERO);
    if amount.is_none() {
        if amount_cell.is_blank() {
            errors.push("Amount is required".to_string());
        } else {
            errors.push(format!(
                "Amount '{}' must be a number greater than zero",
                amount_cell.display()
            ));
        }
    }

    // Bank & rate
    let bank_raw = cell(cols.bank).display();
    let bank_blank = is_blank_bank(&bank_raw);
    let mut bank_id = None;
    let mut rate = None;
    if let Some(g) = group {
        let bank = if bank_blank {
            None
        } else {
            let b = lk.banks.get(&normalize_key(&bank_raw));
            if b.is_none() {
                errors.push(format!("Bank '{}' not found", bank_raw));
            }
            b
        };
        bank_id = bank.map(|b| b.id);

        // An unknown bank name in per-bank mode is already reported above.
        let unresolvable_bank = g.same_rate.is_none() && !bank_blank && bank.is_none();
        if !unresolvable_bank {
            let resolved = resolve_bill_rate(g.id, g.same_rate, bank_id, |b| {
                lk.bank_rates.get(&(g.id, b)).copied()
            });
            match resolved {
                Ok(r) => rate = Some(r),
                Err(RateError::BankRequired) => errors.push(format!(
                    "Bank is required for group '{}' because it has no same rate",
                    g.name
                )),
                Err(RateError::BankNotConfigured { .. }) => errors.push(format!(
                    "Bank '{}' is not configured for group '{}'",
                    bank_raw, g.name
                )),
                Err(RateError::NotPositive(r)) => errors.push(format!(
                    "Rate {} configured for group '{}' is not a positive number",
                    r, g.name
                )),
            }
        }
    }
    if rate.is_none() {
        errors.push("Rate could not be derived".to_string());
    }

    let expected = match (amount, rate) {
        (Some(a), Some(r)) => {
            let product = a.checked_mul(r);
            if product.is_none() {
                errors.push("Amount x rate is out of range".to_string());
            }
            product
        }
        _ => None,
    };

    // Total is informational; only checked when present.
    let total_cell = cell(cols.total);
    if !total_cell.is_blank() {
        match parse_money_cell(total_cell) {
            None => errors.push(format!("Invalid total '{}'", total_cell.display())),
            Some(received) => {
                if let Some(expected) = expected {
                    if !total_matches(expected, received) {
                        errors.push(format!(
                            "Total mismatch, expected {}, received {}",
                            round2(expected).normalize(),
                            round2(received).normalize()
                        ));
                    }
                }
            }
        }
    }

    match (bill_date, group, client, agent_id, amount, rate) {
        (Some(bill_date), Some(g), Some(_), Some(agent_id), Some(amount), Some(rate))
            if errors.is_empty() =>
        {
            Ok(BillInput {
                bill_date,
                group_id: g.id,
                bank_id,
                client_id: g.owner,
                agent_id,
                amount,
                rate: Some(rate),
            })
        }
        _ => {
            let mut row: BTreeMap<String, String> = cols
                .headers
                .iter()
                .enumerate()
                .filter(|(_, h)| !h.is_empty())
                .map(|(i, h)| (h.clone(), cell(i).display()))
                .collect();
            row.insert(
                "Client".into(),
                client.map(|u| u.name.clone()).unwrap_or_default(),
            );
            row.insert(
                "Source".into(),
                source.map(|s| s.to_string()).unwrap_or_default(),
            );
            row.insert(
                "Rate".into(),
                rate.map(|r| r.normalize().to_string()).unwrap_or_default(),
            );
            Err(RowFailure {
                row_number,
                errors,
                row,
            })
        }
    }
}

/// Validate every data row. Whole-file problems are returned as errors;
/// row problems are collected in the second element.
pub fn validate_matrix(
    conn: &Connection,
    matrix: &Matrix,
) -> Result<(Vec<BillInput>, Vec<RowFailure>, usize)> {
    let Some(header) = matrix.first() else {
        return Err(BillingError::validation("No sheet found in file"));
    };
    if matrix.len() < 2 {
        return Err(BillingError::validation(
            "File must contain a header row and at least one data row",
        ));
    }
    let cols = resolve_columns(header)?;

    // Row numbers are 1-based with the header as row 1.
    let data: Vec<(usize, &Vec<CellValue>)> = matrix
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, cells)| !cells.iter().all(CellValue::is_blank))
        .map(|(i, cells)| (i + 1, cells))
        .collect();
    if data.is_empty() {
        return Err(BillingError::validation("No data rows found in file"));
    }

    let lk = Lookups::load(conn)?;
    let mut valid = Vec::new();
    let mut failed = Vec::new();
    for (row_number, cells) in &data {
        match validate_row(&lk, &cols, cells, *row_number) {
            Ok(input) => valid.push(input),
            Err(f) => failed.push(f),
        }
    }
    Ok((valid, failed, data.len()))
}

/// Insert validated bills and their agent bills atomically.
pub fn insert_bills_bulk(conn: &mut Connection, rows: &[BillInput]) -> Result<Vec<i64>> {
    let tx = conn.transaction()?;
    let mut ids = Vec::with_capacity(rows.len());
    for input in rows {
        let bill = insert_bill(&tx, input)?;
        sync_agent_bill(&tx, bill.id)?;
        ids.push(bill.id);
    }
    tx.commit()?;
    Ok(ids)
}

/// All-or-nothing: any failed row rejects the whole batch.
pub fn bulk_upload(conn: &mut Connection, matrix: &Matrix) -> Result<BulkOutcome> {
    let (valid, failed, total_rows) = validate_matrix(conn, matrix)?;
    if !failed.is_empty() {
        warn!(total_rows, failed_rows = failed.len(), "bulk upload rejected");
        return Ok(BulkOutcome::Rejected(BulkReport {
            total_rows,
            failed_rows: failed.len(),
            errors: failed,
        }));
    }
    let bill_ids = insert_bills_bulk(conn, &valid)?;
    info!(inserted = bill_ids.len(), "bulk upload committed");
    Ok(BulkOutcome::Inserted(BulkSummary {
        total_rows,
        inserted: bill_ids.len(),
        bill_ids,
    }))
}

pub fn upload_file(conn: &mut Connection, path: &Path) -> Result<BulkOutcome> {
    let matrix = read_matrix(path)?;
    bulk_upload(conn, &matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn dates_normalize_from_every_shape() {
        let want = d(2026, 3, 5);
        assert_eq!(parse_date_cell(&CellValue::text("2026-03-05")), Some(want));
        assert_eq!(parse_date_cell(&CellValue::text("05-03-2026")), Some(want));
        assert_eq!(parse_date_cell(&CellValue::text("05/03/2026")), Some(want));
        assert_eq!(parse_date_cell(&CellValue::Number(46086.0)), Some(want));
        assert_eq!(parse_date_cell(&CellValue::text("46086")), Some(want));
        assert_eq!(parse_date_cell(&CellValue::Date(want)), Some(want));
        assert_eq!(
            parse_date_cell(&CellValue::text("2026-03-05T10:00:00Z")),
            Some(want)
        );
    }

    #[test]
    fn bad_dates_rejected() {
        assert_eq!(parse_date_cell(&CellValue::text("2026-13-05")), None);
        assert_eq!(parse_date_cell(&CellValue::text("yesterday")), None);
        assert_eq!(parse_date_cell(&CellValue::Number(-4.0)), None);
        assert_eq!(parse_date_cell(&CellValue::Empty), None);
    }

    #[test]
    fn total_tolerance_is_one_cent_inclusive() {
        let expected = Decimal::new(500, 0);
        assert!(total_matches(expected, Decimal::new(50001, 2)));
        assert!(total_matches(expected, Decimal::new(49999, 2)));
        assert!(!total_matches(expected, Decimal::new(50002, 2)));
        // 500.011 rounds to 500.01 before comparison.
        assert!(total_matches(expected, Decimal::new(500011, 3)));
        // 500.015 rounds half away from zero to 500.02.
        assert!(!total_matches(expected, Decimal::new(500015, 3)));
    }

    #[test]
    fn blank_bank_spellings() {
        for s in ["", "  ", "-", "N/A", "n/a"] {
            assert!(is_blank_bank(s), "{s:?}");
        }
        assert!(!is_blank_bank("HDFC"));
    }

    #[test]
    fn missing_columns_listed() {
        let header = vec![CellValue::text(" date "), CellValue::text("GROUP"), CellValue::text("Agent")];
        let err = resolve_columns(&header).err().unwrap();
        assert_eq!(err.to_string(), "Missing required columns: Bank, Amount, Total");
    }

    #[test]
    fn number_cells_display_without_fraction() {
        assert_eq!(CellValue::Number(100.0).display(), "100");
        assert_eq!(CellValue::Number(12.5).display(), "12.5");
    }

    #[test]
    fn workbook_cells_map_to_typed_values() {
        assert_eq!(cell_from_data(&Data::Empty), CellValue::Empty);
        assert_eq!(cell_from_data(&Data::Float(46086.0)), CellValue::Number(46086.0));
        assert_eq!(cell_from_data(&Data::Int(12)), CellValue::Number(12.0));
        assert_eq!(
            cell_from_data(&Data::String(" HDFC ".into())),
            CellValue::Text("HDFC".into())
        );
        assert_eq!(cell_from_data(&Data::String("  ".into())), CellValue::Empty);
    }

    #[test]
    fn money_cells_accept_symbols() {
        assert_eq!(
            parse_money_cell(&CellValue::text("$1,250.50")),
            Some(Decimal::new(125050, 2))
        );
        assert_eq!(parse_money_cell(&CellValue::Number(99.5)), Some(Decimal::new(995, 1)));
        assert_eq!(parse_money_cell(&CellValue::text("ten")), None);
    }
}
