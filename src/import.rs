// CSV Import - bulk-load wallet transactions from a bank export
//
// Expected header: date,description,amount[,category]
// Positive amounts are income, negative amounts are expenses. Each row is
// fingerprinted (wallet, date, amount, description) so importing the
// same file twice inserts nothing the second time.

use anyhow::Context;
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

use crate::db::record_event;
use crate::entities::category::CategoryKind;
use crate::entities::transaction::{self, NewEntry, TransactionKind, INSUFFICIENT_BALANCE};
use crate::entities::user::User;
use crate::entities::wallet::Wallet;
use crate::error::AppResult;
use crate::pricing;
use crate::validation::MAX_AMOUNT;

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    description: String,
    amount: String,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ImportReport {
    pub rows: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// "line N: message" for every skipped row
    pub errors: Vec<String>,
}

/// Fingerprint for duplicate detection across imports
pub fn compute_idempotency_hash(wallet_id: &str, date: NaiveDate, amount: Decimal, description: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}|{}", wallet_id, date, amount.normalize(), description));
    format!("{:x}", hasher.finalize())
}

/// Accepts ISO dates and the local DD/MM/YYYY form
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()
}

/// Accepts `-125000`, `125000.50`, `1.250.000`, `Rp 50.000`,
/// `Rp 1.250.000,50` and `-Rp1.000`.
///
/// '.' groups thousands when a comma is present, when an Rp/IDR prefix is
/// present, when it occurs more than once, or when a single dot is followed
/// by exactly three digits. Otherwise it is the decimal mark.
fn parse_amount(raw: &str) -> Option<Decimal> {
    let mut s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let negative = s.starts_with('-');
    if negative {
        s.remove(0);
    }
    let (s, currency) = match s.strip_prefix("Rp").or_else(|| s.strip_prefix("IDR")) {
        Some(rest) => (rest.to_string(), true),
        None => (s, false),
    };

    let dots = s.matches('.').count();
    let grouped = match s.rsplit_once('.') {
        Some((_, tail)) => currency || dots > 1 || tail.len() == 3,
        None => false,
    };
    let normalized = if s.contains(',') {
        s.replace('.', "").replace(',', ".")
    } else if grouped {
        s.replace('.', "")
    } else {
        s
    };
    let value: Decimal = normalized.parse().ok()?;
    Some(if negative { -value } else { value })
}

fn find_category(conn: &Connection, name: &str, kind: CategoryKind) -> AppResult<Option<String>> {
    use rusqlite::OptionalExtension;
    Ok(conn
        .query_row(
            "SELECT id FROM categories WHERE name = ?1 COLLATE NOCASE AND kind = ?2",
            [name.trim(), kind.as_str()],
            |row| row.get(0),
        )
        .optional()?)
}

fn hash_exists(conn: &Connection, hash: &str) -> AppResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM transactions WHERE idempotency_hash = ?1)",
        [hash],
        |row| row.get(0),
    )?)
}

/// Import every row from `reader` into `wallet`. Bad rows are reported
/// and skipped; a malformed CSV stream aborts the whole import.
pub fn import_transactions<R: Read>(
    conn: &Connection,
    wallet: &Wallet,
    user: &User,
    reader: R,
) -> AppResult<ImportReport> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut report = ImportReport::default();
    let tx = conn.unchecked_transaction()?;

    for (index, result) in csv_reader.deserialize::<CsvRow>().enumerate() {
        // +2: 1-indexed plus the header row
        let line = index + 2;
        let row = result?;
        report.rows += 1;

        let Some(date) = parse_date(&row.date) else {
            report.errors.push(format!("baris {}: tanggal '{}' tidak valid", line, row.date));
            continue;
        };
        let amount = match parse_amount(&row.amount) {
            Some(a) if a.abs() > MAX_AMOUNT => {
                report.errors.push(format!("baris {}: jumlah '{}' melebihi batas maksimal", line, row.amount));
                continue;
            }
            Some(a) if !a.is_zero() => pricing::round_money(a),
            _ => {
                report.errors.push(format!("baris {}: jumlah '{}' tidak valid", line, row.amount));
                continue;
            }
        };
        let description = row.description.trim();
        if description.is_empty() {
            report.errors.push(format!("baris {}: keterangan wajib diisi", line));
            continue;
        }

        let hash = compute_idempotency_hash(&wallet.id, date, amount, description);
        if hash_exists(&tx, &hash)? {
            report.duplicates += 1;
            continue;
        }

        let kind = if amount > Decimal::ZERO {
            TransactionKind::Income
        } else {
            TransactionKind::Expense
        };
        let category_kind = if kind == TransactionKind::Income {
            CategoryKind::Income
        } else {
            CategoryKind::Expense
        };
        let category_id = match row.category.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(name) => find_category(&tx, name, category_kind)?,
            None => None,
        };

        if transaction::adjust_balance(&tx, &wallet.id, amount)?.is_none() {
            report
                .errors
                .push(format!("baris {}: {}", line, INSUFFICIENT_BALANCE));
            continue;
        }
        transaction::insert_entry(
            &tx,
            &NewEntry {
                wallet_id: &wallet.id,
                user_id: &user.id,
                category_id: category_id.as_deref(),
                kind,
                amount: amount.abs(),
                description,
                transaction_date: date,
                transfer_id: None,
                idempotency_hash: Some(&hash),
            },
        )?;
        report.inserted += 1;
    }

    tx.commit()?;

    if report.inserted > 0 {
        record_event(
            conn,
            "wallet.imported",
            "wallet",
            &wallet.id,
            serde_json::json!({
                "rows": report.rows,
                "inserted": report.inserted,
                "duplicates": report.duplicates,
            }),
            &user.id,
        )?;
    }

    tracing::info!(
        wallet_id = %wallet.id,
        rows = report.rows,
        inserted = report.inserted,
        duplicates = report.duplicates,
        skipped = report.errors.len(),
        "csv import finished"
    );
    Ok(report)
}

pub fn import_transactions_file(
    conn: &Connection,
    wallet: &Wallet,
    user: &User,
    path: &Path,
) -> anyhow::Result<ImportReport> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    Ok(import_transactions(conn, wallet, user, file)?)
}
