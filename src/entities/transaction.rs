// Transaction Entity - the wallet ledger
//
// Every balance change is a row here. `wallets.balance` is a cached sum
// that is updated in the same database transaction as the rows, so
// balance == Σ signed amounts holds after every commit.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::{decimal_at, enum_at, new_id, record_event};
use crate::entities::category::{check_category_kind, CategoryKind};
use crate::entities::user::User;
use crate::entities::wallet::{get_wallet_for, Wallet};
use crate::error::{AppError, AppResult};
use crate::pagination::{PageRequest, Paginated};
use crate::pricing;
use crate::validation::Validator;

pub const INSUFFICIENT_BALANCE: &str = "Saldo tidak mencukupi.";

// ============================================================================
// TRANSACTION KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Income,
    Expense,
    TransferIn,
    TransferOut,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
            TransactionKind::TransferIn => "transfer_in",
            TransactionKind::TransferOut => "transfer_out",
        }
    }

    pub fn parse(s: &str) -> Option<TransactionKind> {
        match s {
            "income" => Some(TransactionKind::Income),
            "expense" => Some(TransactionKind::Expense),
            "transfer_in" => Some(TransactionKind::TransferIn),
            "transfer_out" => Some(TransactionKind::TransferOut),
            _ => None,
        }
    }

    /// Kinds a user can record directly (transfers go through `transfer`)
    pub fn parse_manual(s: &str) -> Option<TransactionKind> {
        match TransactionKind::parse(s) {
            Some(kind @ (TransactionKind::Income | TransactionKind::Expense)) => Some(kind),
            _ => None,
        }
    }

    pub fn is_credit(&self) -> bool {
        matches!(self, TransactionKind::Income | TransactionKind::TransferIn)
    }

    /// Amount as it affects the balance
    pub fn signed(&self, amount: Decimal) -> Decimal {
        if self.is_credit() {
            amount
        } else {
            -amount
        }
    }

    fn category_kind(&self) -> CategoryKind {
        if self.is_credit() {
            CategoryKind::Income
        } else {
            CategoryKind::Expense
        }
    }
}

// ============================================================================
// LEDGER ENTRY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletTransaction {
    pub id: String,
    pub wallet_id: String,
    pub user_id: String,
    pub user_name: String,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub kind: TransactionKind,
    /// Always positive; direction comes from `kind`
    pub amount: Decimal,
    pub signed_amount: Decimal,
    pub description: String,
    pub transaction_date: NaiveDate,
    pub transfer_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionInput {
    pub kind: Option<String>,
    pub amount: Option<Decimal>,
    pub category_id: Option<String>,
    pub description: Option<String>,
    pub transaction_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransferInput {
    pub from_wallet_id: Option<String>,
    pub to_wallet_id: Option<String>,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub transaction_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    pub kind: Option<String>,
    pub category_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Transfer {
    pub transfer_id: String,
    pub outgoing: WalletTransaction,
    pub incoming: WalletTransaction,
}

/// Row to append to the ledger
pub(crate) struct NewEntry<'a> {
    pub wallet_id: &'a str,
    pub user_id: &'a str,
    pub category_id: Option<&'a str>,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: &'a str,
    pub transaction_date: NaiveDate,
    pub transfer_id: Option<&'a str>,
    pub idempotency_hash: Option<&'a str>,
}

const TRANSACTION_SELECT: &str = "SELECT t.id, t.wallet_id, t.user_id, u.name, t.category_id, c.name,
        t.kind, t.amount, t.description, t.transaction_date, t.transfer_id, t.created_at
     FROM transactions t
     JOIN users u ON u.id = t.user_id
     LEFT JOIN categories c ON c.id = t.category_id";

fn transaction_from_row(row: &Row) -> rusqlite::Result<WalletTransaction> {
    let kind: TransactionKind = enum_at(row, 6, TransactionKind::parse)?;
    let amount = decimal_at(row, 7)?;
    Ok(WalletTransaction {
        id: row.get(0)?,
        wallet_id: row.get(1)?,
        user_id: row.get(2)?,
        user_name: row.get(3)?,
        category_id: row.get(4)?,
        category_name: row.get(5)?,
        kind,
        amount,
        signed_amount: kind.signed(amount),
        description: row.get(8)?,
        transaction_date: row.get(9)?,
        transfer_id: row.get(10)?,
        created_at: row.get(11)?,
    })
}

// ============================================================================
// LEDGER PRIMITIVES
// ============================================================================

pub(crate) fn insert_entry(conn: &Connection, entry: &NewEntry) -> AppResult<String> {
    let id = new_id();
    conn.execute(
        "INSERT INTO transactions (id, wallet_id, user_id, category_id, kind, amount, description,
            transaction_date, transfer_id, idempotency_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id,
            entry.wallet_id,
            entry.user_id,
            entry.category_id,
            entry.kind.as_str(),
            entry.amount.to_string(),
            entry.description,
            entry.transaction_date,
            entry.transfer_id,
            entry.idempotency_hash,
            Utc::now(),
        ],
    )?;
    Ok(id)
}

/// Add `delta` to the cached balance. Returns `None` without writing when
/// the result would be negative.
pub(crate) fn adjust_balance(conn: &Connection, wallet_id: &str, delta: Decimal) -> AppResult<Option<Decimal>> {
    let current: String = conn
        .query_row("SELECT balance FROM wallets WHERE id = ?1", [wallet_id], |row| row.get(0))
        .optional()?
        .ok_or(AppError::NotFound("Dompet"))?;
    let current: Decimal = current
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt balance for wallet {}: {}", wallet_id, e))?;

    let next = current
        .checked_add(delta)
        .ok_or_else(|| AppError::invalid("amount", "Saldo dompet melebihi batas maksimal."))?;
    if next < Decimal::ZERO {
        return Ok(None);
    }

    conn.execute(
        "UPDATE wallets SET balance = ?2, updated_at = ?3 WHERE id = ?1",
        params![wallet_id, next.to_string(), Utc::now()],
    )?;
    Ok(Some(next))
}

/// Balance recomputed from the ledger rows
pub fn ledger_balance(conn: &Connection, wallet_id: &str) -> AppResult<Decimal> {
    let mut stmt = conn.prepare("SELECT kind, amount FROM transactions WHERE wallet_id = ?1")?;
    let rows = stmt
        .query_map([wallet_id], |row| {
            Ok((enum_at(row, 0, TransactionKind::parse)?, decimal_at(row, 1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().map(|(kind, amount)| kind.signed(amount)).sum())
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn get_transaction(conn: &Connection, id: &str) -> AppResult<WalletTransaction> {
    let sql = format!("{} WHERE t.id = ?1", TRANSACTION_SELECT);
    conn.query_row(&sql, [id], transaction_from_row)
        .optional()?
        .ok_or(AppError::NotFound("Transaksi"))
}

/// Newest first. The wallet must already be access-checked.
pub fn list_transactions(
    conn: &Connection,
    wallet: &Wallet,
    filter: &TransactionFilter,
    page: PageRequest,
) -> AppResult<Paginated<WalletTransaction>> {
    let kind = match filter.kind.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            TransactionKind::parse(raw)
                .ok_or_else(|| AppError::invalid("kind", "Jenis transaksi yang dipilih tidak valid."))?,
        ),
        None => None,
    };
    let pattern = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(crate::db::like_pattern);

    let filter_sql = "t.wallet_id = ?1
        AND (?2 IS NULL OR t.kind = ?2)
        AND (?3 IS NULL OR t.category_id = ?3)
        AND (?4 IS NULL OR t.transaction_date >= ?4)
        AND (?5 IS NULL OR t.transaction_date <= ?5)
        AND (?6 IS NULL OR t.description LIKE ?6 ESCAPE '\\')";
    let kind_str = kind.map(|k| k.as_str());

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM transactions t WHERE {}", filter_sql),
        params![wallet.id, kind_str, filter.category_id, filter.from, filter.to, pattern],
        |row| row.get(0),
    )?;

    let sql = format!(
        "{} WHERE {} ORDER BY t.transaction_date DESC, t.created_at DESC LIMIT ?7 OFFSET ?8",
        TRANSACTION_SELECT, filter_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(
            params![
                wallet.id,
                kind_str,
                filter.category_id,
                filter.from,
                filter.to,
                pattern,
                page.limit(),
                page.offset()
            ],
            transaction_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Paginated::new(items, page, total))
}

// ============================================================================
// MUTATIONS
// ============================================================================

/// Record an income or expense against an accessible wallet.
pub fn record_transaction(
    conn: &Connection,
    wallet: &Wallet,
    input: &TransactionInput,
    user: &User,
    today: NaiveDate,
) -> AppResult<WalletTransaction> {
    let mut v = Validator::new();
    let kind = v.one_of("kind", "Jenis transaksi", input.kind.as_deref(), TransactionKind::parse_manual);
    let amount = v.required("amount", "Jumlah", input.amount).map(pricing::round_money);
    if let Some(amount) = amount {
        v.positive("amount", "Jumlah", amount);
        v.max_amount("amount", "Jumlah", amount);
    }
    let description = v.required_str("description", "Keterangan", input.description.as_deref(), 255);
    let category_id = input
        .category_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let (Some(id), Some(kind)) = (category_id, kind) {
        check_category_kind(conn, &mut v, "category_id", id, kind.category_kind())?;
    }
    v.finish()?;

    let (Some(kind), Some(amount), Some(description)) = (kind, amount, description) else {
        return Err(AppError::invalid("amount", "Data transaksi tidak lengkap."));
    };

    let tx = conn.unchecked_transaction()?;
    let id = insert_entry(
        &tx,
        &NewEntry {
            wallet_id: &wallet.id,
            user_id: &user.id,
            category_id,
            kind,
            amount,
            description: &description,
            transaction_date: input.transaction_date.unwrap_or(today),
            transfer_id: None,
            idempotency_hash: None,
        },
    )?;
    if adjust_balance(&tx, &wallet.id, kind.signed(amount))?.is_none() {
        return Err(AppError::invalid("amount", INSUFFICIENT_BALANCE));
    }
    tx.commit()?;

    tracing::info!(transaction_id = %id, wallet_id = %wallet.id, kind = kind.as_str(), "transaction recorded");
    get_transaction(conn, &id)
}

/// Move money between two wallets the user can access. Both legs share a
/// `transfer_id` and are written atomically.
pub fn transfer(conn: &Connection, input: &TransferInput, user: &User, today: NaiveDate) -> AppResult<Transfer> {
    let mut v = Validator::new();
    let from_id = v.required_str("from_wallet_id", "Dompet asal", input.from_wallet_id.as_deref(), 64);
    let to_id = v.required_str("to_wallet_id", "Dompet tujuan", input.to_wallet_id.as_deref(), 64);
    let amount = v.required("amount", "Jumlah", input.amount).map(pricing::round_money);
    if let Some(amount) = amount {
        v.positive("amount", "Jumlah", amount);
        v.max_amount("amount", "Jumlah", amount);
    }
    let description = v
        .optional_str("description", "Keterangan", input.description.as_deref(), 255)
        .unwrap_or_else(|| "Transfer".to_string());

    let lookup = |v: &mut Validator, field: &str, label: &str, id: &Option<String>| -> AppResult<Option<Wallet>> {
        match id {
            Some(id) => match get_wallet_for(conn, id, user) {
                Ok(wallet) => Ok(Some(wallet)),
                Err(AppError::NotFound(_)) => {
                    v.not_exists(field, label);
                    Ok(None)
                }
                Err(e) => Err(e),
            },
            None => Ok(None),
        }
    };
    let from = lookup(&mut v, "from_wallet_id", "Dompet asal", &from_id)?;
    let to = lookup(&mut v, "to_wallet_id", "Dompet tujuan", &to_id)?;

    if let (Some(from), Some(to)) = (&from, &to) {
        if from.id == to.id {
            v.add("to_wallet_id", "Dompet tujuan harus berbeda dengan dompet asal.");
        } else if from.currency != to.currency {
            v.add("to_wallet_id", "Mata uang dompet tujuan harus sama dengan dompet asal.");
        }
    }
    v.finish()?;

    let (Some(from), Some(to), Some(amount)) = (from, to, amount) else {
        return Err(AppError::invalid("amount", "Data transfer tidak lengkap."));
    };

    let transfer_id = new_id();
    let date = input.transaction_date.unwrap_or(today);
    let tx = conn.unchecked_transaction()?;

    let out_id = insert_entry(
        &tx,
        &NewEntry {
            wallet_id: &from.id,
            user_id: &user.id,
            category_id: None,
            kind: TransactionKind::TransferOut,
            amount,
            description: &description,
            transaction_date: date,
            transfer_id: Some(&transfer_id),
            idempotency_hash: None,
        },
    )?;
    let in_id = insert_entry(
        &tx,
        &NewEntry {
            wallet_id: &to.id,
            user_id: &user.id,
            category_id: None,
            kind: TransactionKind::TransferIn,
            amount,
            description: &description,
            transaction_date: date,
            transfer_id: Some(&transfer_id),
            idempotency_hash: None,
        },
    )?;
    if adjust_balance(&tx, &from.id, -amount)?.is_none() {
        return Err(AppError::invalid("amount", INSUFFICIENT_BALANCE));
    }
    adjust_balance(&tx, &to.id, amount)?;
    tx.commit()?;

    tracing::info!(transfer_id = %transfer_id, from = %from.id, to = %to.id, "transfer recorded");
    Ok(Transfer {
        transfer_id,
        outgoing: get_transaction(conn, &out_id)?,
        incoming: get_transaction(conn, &in_id)?,
    })
}

/// Remove a ledger row and reverse its effect. Deleting either leg of a
/// transfer removes both; the user needs access to both wallets.
pub fn delete_transaction(conn: &Connection, id: &str, user: &User) -> AppResult<()> {
    let entry = get_transaction(conn, id)?;
    get_wallet_for(conn, &entry.wallet_id, user).map_err(|_| AppError::NotFound("Transaksi"))?;

    let legs = match &entry.transfer_id {
        Some(transfer_id) => {
            let sql = format!("{} WHERE t.transfer_id = ?1", TRANSACTION_SELECT);
            let mut stmt = conn.prepare(&sql)?;
            let legs = stmt
                .query_map([transfer_id], transaction_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            for leg in &legs {
                get_wallet_for(conn, &leg.wallet_id, user)?;
            }
            legs
        }
        None => vec![entry],
    };

    let tx = conn.unchecked_transaction()?;
    for leg in &legs {
        tx.execute("DELETE FROM transactions WHERE id = ?1", [&leg.id])?;
        if adjust_balance(&tx, &leg.wallet_id, -leg.signed_amount)?.is_none() {
            return Err(AppError::conflict(
                "Transaksi tidak dapat dihapus karena saldo dompet akan menjadi negatif.",
            ));
        }
    }
    tx.commit()?;

    record_event(
        conn,
        "transaction.deleted",
        "transaction",
        id,
        serde_json::json!({ "legs": legs.len(), "wallet_id": legs.first().map(|l| l.wallet_id.clone()) }),
        &user.id,
    )?;
    tracing::info!(transaction_id = %id, legs = legs.len(), "transaction deleted");
    Ok(())
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryTotal {
    pub category_id: Option<String>,
    pub category_name: String,
    pub kind: TransactionKind,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WalletSummary {
    pub wallet_id: String,
    pub balance: Decimal,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub total_transfer_in: Decimal,
    pub total_transfer_out: Decimal,
    /// income − expense (transfers excluded)
    pub net: Decimal,
    pub transaction_count: usize,
    pub by_category: Vec<CategoryTotal>,
}

/// Totals per kind and per category over an optional date window.
pub fn wallet_summary(
    conn: &Connection,
    wallet: &Wallet,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> AppResult<WalletSummary> {
    let sql = format!(
        "{} WHERE t.wallet_id = ?1
            AND (?2 IS NULL OR t.transaction_date >= ?2)
            AND (?3 IS NULL OR t.transaction_date <= ?3)",
        TRANSACTION_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map(params![wallet.id, from, to], transaction_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut summary = WalletSummary {
        wallet_id: wallet.id.clone(),
        balance: wallet.balance,
        from,
        to,
        total_income: Decimal::ZERO,
        total_expense: Decimal::ZERO,
        total_transfer_in: Decimal::ZERO,
        total_transfer_out: Decimal::ZERO,
        net: Decimal::ZERO,
        transaction_count: entries.len(),
        by_category: Vec::new(),
    };

    let mut per_category: BTreeMap<(&'static str, Option<String>), CategoryTotal> = BTreeMap::new();
    for entry in &entries {
        match entry.kind {
            TransactionKind::Income => summary.total_income += entry.amount,
            TransactionKind::Expense => summary.total_expense += entry.amount,
            TransactionKind::TransferIn => summary.total_transfer_in += entry.amount,
            TransactionKind::TransferOut => summary.total_transfer_out += entry.amount,
        }
        if matches!(entry.kind, TransactionKind::Income | TransactionKind::Expense) {
            let total = per_category
                .entry((entry.kind.as_str(), entry.category_id.clone()))
                .or_insert_with(|| CategoryTotal {
                    category_id: entry.category_id.clone(),
                    category_name: entry
                        .category_name
                        .clone()
                        .unwrap_or_else(|| "Tanpa kategori".to_string()),
                    kind: entry.kind,
                    total: Decimal::ZERO,
                });
            total.total += entry.amount;
        }
    }

    summary.net = summary.total_income - summary.total_expense;
    summary.by_category = per_category.into_values().collect();
    summary
        .by_category
        .sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.category_name.cmp(&b.category_name)));
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;
    use crate::entities::category::create_test_category;
    use crate::entities::user::create_test_user;
    use crate::entities::wallet::create_test_wallet;
    use crate::permissions::Role;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn expense(amount: Decimal, category_id: Option<&str>) -> TransactionInput {
        TransactionInput {
            kind: Some("expense".to_string()),
            amount: Some(amount),
            category_id: category_id.map(str::to_string),
            description: Some("Belanja".to_string()),
            transaction_date: Some(day(5)),
        }
    }

    #[test]
    fn test_record_updates_balance() {
        let conn = test_connection();
        let user = create_test_user(&conn, "Rina", Role::Customer);
        let wallet = create_test_wallet(&conn, &user, "Harian", dec!(100000));
        let food = create_test_category(&conn, "Makan", CategoryKind::Expense);

        let entry = record_transaction(&conn, &wallet, &expense(dec!(25000.50), Some(&food.id)), &user, day(10)).unwrap();
        assert_eq!(entry.signed_amount, dec!(-25000.50));
        assert_eq!(entry.category_name.as_deref(), Some("Makan"));

        let wallet = get_wallet_for(&conn, &wallet.id, &user).unwrap();
        assert_eq!(wallet.balance, dec!(74999.50));
        assert_eq!(ledger_balance(&conn, &wallet.id).unwrap(), wallet.balance);
    }

    #[test]
    fn test_amounts_beyond_the_limit_are_refused() {
        let conn = test_connection();
        let user = create_test_user(&conn, "Rina", Role::Customer);
        let wallet = create_test_wallet(&conn, &user, "Tabungan", dec!(0));
        let income = |amount: Decimal| TransactionInput {
            kind: Some("income".to_string()),
            amount: Some(amount),
            category_id: None,
            description: Some("Bonus".to_string()),
            transaction_date: Some(day(5)),
        };

        for _ in 0..2 {
            match record_transaction(&conn, &wallet, &income(Decimal::MAX), &user, day(10)) {
                Err(AppError::Validation(e)) => assert_eq!(e.fields(), vec!["amount"]),
                other => panic!("expected validation error, got {:?}", other),
            }
        }

        // A cached balance already at the ceiling cannot grow further
        conn.execute(
            "UPDATE wallets SET balance = ?2 WHERE id = ?1",
            params![wallet.id, Decimal::MAX.to_string()],
        )
        .unwrap();
        let result = record_transaction(&conn, &wallet, &income(dec!(1)), &user, day(10));
        assert!(matches!(result, Err(AppError::Validation(_))));

        let stored: i64 = conn
            .query_row("SELECT COUNT(*) FROM transactions WHERE wallet_id = ?1", [&wallet.id], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, 0);
    }

    #[test]
    fn test_expense_cannot_overdraw() {
        let conn = test_connection();
        let user = create_test_user(&conn, "Rina", Role::Customer);
        let wallet = create_test_wallet(&conn, &user, "Harian", dec!(1000));

        let err = record_transaction(&conn, &wallet, &expense(dec!(1000.01), None), &user, day(10)).unwrap_err();
        match err {
            AppError::Validation(e) => assert_eq!(e.get("amount").unwrap()[0], INSUFFICIENT_BALANCE),
            other => panic!("expected validation error, got {:?}", other),
        }

        // Nothing was written
        let wallet = get_wallet_for(&conn, &wallet.id, &user).unwrap();
        assert_eq!(wallet.balance, dec!(1000));
        assert_eq!(ledger_balance(&conn, &wallet.id).unwrap(), dec!(1000));
    }

    #[test]
    fn test_category_kind_must_match() {
        let conn = test_connection();
        let user = create_test_user(&conn, "Rina", Role::Customer);
        let wallet = create_test_wallet(&conn, &user, "Harian", dec!(1000));
        let salary = create_test_category(&conn, "Gaji", CategoryKind::Income);

        let err = record_transaction(&conn, &wallet, &expense(dec!(10), Some(&salary.id)), &user, day(10)).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.has("category_id")));

        let mut input = expense(dec!(10), None);
        input.kind = Some("transfer_in".to_string());
        let err = record_transaction(&conn, &wallet, &input, &user, day(10)).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.has("kind")));
    }

    #[test]
    fn test_transfer_moves_money_atomically() {
        let conn = test_connection();
        let user = create_test_user(&conn, "Rina", Role::Customer);
        let a = create_test_wallet(&conn, &user, "A", dec!(500));
        let b = create_test_wallet(&conn, &user, "B", dec!(0));

        let result = transfer(
            &conn,
            &TransferInput {
                from_wallet_id: Some(a.id.clone()),
                to_wallet_id: Some(b.id.clone()),
                amount: Some(dec!(200)),
                description: None,
                transaction_date: None,
            },
            &user,
            day(1),
        )
        .unwrap();
        assert_eq!(result.outgoing.transfer_id, result.incoming.transfer_id);
        assert_eq!(result.outgoing.kind, TransactionKind::TransferOut);

        assert_eq!(get_wallet_for(&conn, &a.id, &user).unwrap().balance, dec!(300));
        assert_eq!(get_wallet_for(&conn, &b.id, &user).unwrap().balance, dec!(200));

        // Overdrawing transfer leaves both wallets untouched
        let err = transfer(
            &conn,
            &TransferInput {
                from_wallet_id: Some(a.id.clone()),
                to_wallet_id: Some(b.id.clone()),
                amount: Some(dec!(301)),
                description: None,
                transaction_date: None,
            },
            &user,
            day(1),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(ledger_balance(&conn, &a.id).unwrap(), dec!(300));
        assert_eq!(ledger_balance(&conn, &b.id).unwrap(), dec!(200));

        // Deleting one leg removes both
        delete_transaction(&conn, &result.incoming.id, &user).unwrap();
        assert_eq!(get_wallet_for(&conn, &a.id, &user).unwrap().balance, dec!(500));
        assert_eq!(get_wallet_for(&conn, &b.id, &user).unwrap().balance, dec!(0));
    }

    #[test]
    fn test_transfer_rejects_same_wallet_and_foreign_wallet() {
        let conn = test_connection();
        let user = create_test_user(&conn, "Rina", Role::Customer);
        let stranger = create_test_user(&conn, "Stranger", Role::Customer);
        let mine = create_test_wallet(&conn, &user, "Mine", dec!(100));
        let theirs = create_test_wallet(&conn, &stranger, "Theirs", dec!(100));

        let err = transfer(
            &conn,
            &TransferInput {
                from_wallet_id: Some(mine.id.clone()),
                to_wallet_id: Some(mine.id.clone()),
                amount: Some(dec!(10)),
                ..Default::default()
            },
            &user,
            day(1),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.has("to_wallet_id")));

        let err = transfer(
            &conn,
            &TransferInput {
                from_wallet_id: Some(mine.id.clone()),
                to_wallet_id: Some(theirs.id.clone()),
                amount: Some(dec!(10)),
                ..Default::default()
            },
            &user,
            day(1),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.has("to_wallet_id")));
    }

    #[test]
    fn test_delete_income_refused_when_balance_would_go_negative() {
        let conn = test_connection();
        let user = create_test_user(&conn, "Rina", Role::Customer);
        let wallet = create_test_wallet(&conn, &user, "Harian", dec!(0));

        let income = record_transaction(
            &conn,
            &wallet,
            &TransactionInput {
                kind: Some("income".to_string()),
                amount: Some(dec!(100)),
                category_id: None,
                description: Some("Bonus".to_string()),
                transaction_date: None,
            },
            &user,
            day(1),
        )
        .unwrap();
        record_transaction(&conn, &wallet, &expense(dec!(60), None), &user, day(2)).unwrap();

        let err = delete_transaction(&conn, &income.id, &user).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(get_wallet_for(&conn, &wallet.id, &user).unwrap().balance, dec!(40));
    }

    #[test]
    fn test_list_and_summary() {
        let conn = test_connection();
        let user = create_test_user(&conn, "Rina", Role::Customer);
        let wallet = create_test_wallet(&conn, &user, "Harian", dec!(1000));
        let food = create_test_category(&conn, "Makan", CategoryKind::Expense);

        record_transaction(&conn, &wallet, &expense(dec!(100), Some(&food.id)), &user, day(1)).unwrap();
        record_transaction(&conn, &wallet, &expense(dec!(50), Some(&food.id)), &user, day(1)).unwrap();
        record_transaction(&conn, &wallet, &expense(dec!(30), None), &user, day(1)).unwrap();

        let page = list_transactions(
            &conn,
            &wallet,
            &TransactionFilter { kind: Some("expense".to_string()), ..Default::default() },
            PageRequest::new(1, 2),
        )
        .unwrap();
        assert_eq!(page.meta.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.meta.last_page, 2);

        let wallet = get_wallet_for(&conn, &wallet.id, &user).unwrap();
        let summary = wallet_summary(&conn, &wallet, None, None).unwrap();
        assert_eq!(summary.total_income, dec!(1000));
        assert_eq!(summary.total_expense, dec!(180));
        assert_eq!(summary.net, dec!(820));
        assert_eq!(summary.balance, dec!(820));

        let makan = summary
            .by_category
            .iter()
            .find(|c| c.category_name == "Makan")
            .unwrap();
        assert_eq!(makan.total, dec!(150));
    }
}
