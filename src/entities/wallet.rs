// Wallet Entity - named money-holding account shared through user links
//
// A wallet has no owner column: ownership lives in `user_wallets`, where
// the creator is linked as owner and others can be added as members.
// The balance column is maintained by the ledger in `transaction.rs`.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::{decimal_at, enum_at, new_id};
use crate::entities::transaction::{self, NewEntry, TransactionKind};
use crate::entities::user::{self, User};
use crate::error::{AppError, AppResult};
use crate::pricing;
use crate::validation::{is_currency_code, Validator};

// ============================================================================
// WALLET ROLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletRole {
    /// Can rename, share and delete the wallet
    Owner,

    /// Can record and delete transactions
    Member,
}

impl WalletRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletRole::Owner => "owner",
            WalletRole::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<WalletRole> {
        match s {
            "owner" => Some(WalletRole::Owner),
            "member" => Some(WalletRole::Member),
            _ => None,
        }
    }
}

// ============================================================================
// WALLET RESOURCE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wallet {
    pub id: String,
    pub name: String,
    pub currency: String,
    pub balance: Decimal,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The viewing user's link to this wallet
    pub role: WalletRole,
}

impl Wallet {
    pub fn is_owner(&self) -> bool {
        self.role == WalletRole::Owner
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletMember {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub role: WalletRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletInput {
    pub name: Option<String>,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub initial_balance: Option<Decimal>,
    /// Date of the opening transaction, defaults to today
    pub opened_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletUpdateInput {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberInput {
    pub email: Option<String>,
}

const WALLET_SELECT: &str = "SELECT w.id, w.name, w.currency, w.balance, w.description,
        w.created_at, w.updated_at, uw.role
     FROM wallets w
     JOIN user_wallets uw ON uw.wallet_id = w.id";

fn wallet_from_row(row: &Row) -> rusqlite::Result<Wallet> {
    Ok(Wallet {
        id: row.get(0)?,
        name: row.get(1)?,
        currency: row.get(2)?,
        balance: decimal_at(row, 3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        role: enum_at(row, 7, WalletRole::parse)?,
    })
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn list_wallets(conn: &Connection, user: &User) -> AppResult<Vec<Wallet>> {
    let sql = format!("{} WHERE uw.user_id = ?1 ORDER BY w.name ASC", WALLET_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let wallets = stmt
        .query_map([&user.id], wallet_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(wallets)
}

/// Wallets the user is not linked to are reported as missing.
pub fn get_wallet_for(conn: &Connection, id: &str, user: &User) -> AppResult<Wallet> {
    let sql = format!("{} WHERE w.id = ?1 AND uw.user_id = ?2", WALLET_SELECT);
    conn.query_row(&sql, params![id, user.id], wallet_from_row)
        .optional()?
        .ok_or(AppError::NotFound("Dompet"))
}

fn require_owner(wallet: &Wallet) -> AppResult<()> {
    if wallet.is_owner() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// New wallet linked to `user` as owner. A positive initial balance is
/// booked as an opening income so the balance always matches the ledger.
pub fn create_wallet(conn: &Connection, input: &WalletInput, user: &User, today: NaiveDate) -> AppResult<Wallet> {
    let mut v = Validator::new();
    let name = v.required_str("name", "Nama dompet", input.name.as_deref(), 100);
    let currency = v
        .required_str("currency", "Mata uang", input.currency.as_deref(), 3)
        .map(|c| c.to_uppercase());
    if let Some(currency) = &currency {
        if !v.has("currency") && !is_currency_code(currency) {
            v.add("currency", "Mata uang harus berupa kode 3 huruf (contoh: IDR).");
        }
    }
    let description = v.optional_str("description", "Deskripsi", input.description.as_deref(), 500);
    let initial_balance = pricing::round_money(input.initial_balance.unwrap_or(Decimal::ZERO));
    v.non_negative("initial_balance", "Saldo awal", initial_balance);
    v.max_amount("initial_balance", "Saldo awal", initial_balance);
    v.finish()?;

    let id = new_id();
    let now = Utc::now();
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO wallets (id, name, currency, balance, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, '0', ?4, ?5, ?5)",
        params![id, name, currency, description, now],
    )?;
    tx.execute(
        "INSERT INTO user_wallets (user_id, wallet_id, role, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![user.id, id, WalletRole::Owner.as_str(), now],
    )?;

    if initial_balance > Decimal::ZERO {
        transaction::insert_entry(
            &tx,
            &NewEntry {
                wallet_id: &id,
                user_id: &user.id,
                category_id: None,
                kind: TransactionKind::Income,
                amount: initial_balance,
                description: "Saldo awal",
                transaction_date: input.opened_on.unwrap_or(today),
                transfer_id: None,
                idempotency_hash: None,
            },
        )?;
        transaction::adjust_balance(&tx, &id, initial_balance)?;
    }
    tx.commit()?;

    tracing::info!(wallet_id = %id, user_id = %user.id, "wallet created");
    get_wallet_for(conn, &id, user)
}

pub fn update_wallet(conn: &Connection, id: &str, input: &WalletUpdateInput, user: &User) -> AppResult<Wallet> {
    let wallet = get_wallet_for(conn, id, user)?;
    require_owner(&wallet)?;

    let mut v = Validator::new();
    let name = v.required_str("name", "Nama dompet", input.name.as_deref(), 100);
    let description = v.optional_str("description", "Deskripsi", input.description.as_deref(), 500);
    v.finish()?;

    conn.execute(
        "UPDATE wallets SET name = ?2, description = ?3, updated_at = ?4 WHERE id = ?1",
        params![id, name, description, Utc::now()],
    )?;

    get_wallet_for(conn, id, user)
}

/// Deleting a wallet removes its ledger too. A wallet with transfer legs is
/// refused until those transfers are deleted, so no other wallet is left
/// holding half of a transfer.
pub fn delete_wallet(conn: &Connection, id: &str, user: &User) -> AppResult<()> {
    let wallet = get_wallet_for(conn, id, user)?;
    require_owner(&wallet)?;
    if has_transfers(conn, id)? {
        return Err(AppError::conflict(
            "Dompet masih memiliki transfer. Hapus transfer tersebut terlebih dahulu.",
        ));
    }
    conn.execute("DELETE FROM wallets WHERE id = ?1", [id])?;
    tracing::info!(wallet_id = %id, user_id = %user.id, "wallet deleted");
    Ok(())
}

fn has_transfers(conn: &Connection, wallet_id: &str) -> AppResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM transactions WHERE wallet_id = ?1 AND transfer_id IS NOT NULL)",
        [wallet_id],
        |row| row.get(0),
    )?)
}

pub fn list_members(conn: &Connection, wallet_id: &str) -> AppResult<Vec<WalletMember>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.name, u.email, uw.role, uw.created_at
         FROM user_wallets uw
         JOIN users u ON u.id = uw.user_id
         WHERE uw.wallet_id = ?1
         ORDER BY uw.role DESC, u.name ASC",
    )?;
    let members = stmt
        .query_map([wallet_id], |row| {
            Ok(WalletMember {
                user_id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                role: enum_at(row, 3, WalletRole::parse)?,
                joined_at: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(members)
}

/// Share the wallet with another user, identified by email.
pub fn add_member(conn: &Connection, wallet_id: &str, input: &MemberInput, user: &User) -> AppResult<Vec<WalletMember>> {
    let wallet = get_wallet_for(conn, wallet_id, user)?;
    require_owner(&wallet)?;

    let mut v = Validator::new();
    let email = v.required_str("email", "Email", input.email.as_deref(), 255);
    let member = match &email {
        Some(email) => user::find_by_email(conn, email)?,
        None => None,
    };
    if email.is_some() && member.is_none() {
        v.add("email", "Pengguna dengan email ini tidak ditemukan.");
    }
    if let Some(member) = &member {
        let linked: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM user_wallets WHERE user_id = ?1 AND wallet_id = ?2)",
            params![member.id, wallet_id],
            |row| row.get(0),
        )?;
        if linked {
            v.add("email", "Pengguna sudah menjadi anggota dompet ini.");
        }
    }
    v.finish()?;

    if let Some(member) = member {
        conn.execute(
            "INSERT INTO user_wallets (user_id, wallet_id, role, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![member.id, wallet_id, WalletRole::Member.as_str(), Utc::now()],
        )?;
        tracing::info!(wallet_id = %wallet_id, member_id = %member.id, "wallet shared");
    }

    list_members(conn, wallet_id)
}

/// Owners can remove members; members can remove themselves. The owner
/// link itself is never removed.
pub fn remove_member(conn: &Connection, wallet_id: &str, member_id: &str, user: &User) -> AppResult<Vec<WalletMember>> {
    let wallet = get_wallet_for(conn, wallet_id, user)?;
    if !wallet.is_owner() && member_id != user.id {
        return Err(AppError::Forbidden);
    }

    let role: Option<String> = conn
        .query_row(
            "SELECT role FROM user_wallets WHERE user_id = ?1 AND wallet_id = ?2",
            params![member_id, wallet_id],
            |row| row.get(0),
        )
        .optional()?;
    match role.as_deref().and_then(WalletRole::parse) {
        None => return Err(AppError::NotFound("Anggota dompet")),
        Some(WalletRole::Owner) => {
            return Err(AppError::conflict("Pemilik dompet tidak dapat dikeluarkan."))
        }
        Some(WalletRole::Member) => {}
    }

    conn.execute(
        "DELETE FROM user_wallets WHERE user_id = ?1 AND wallet_id = ?2",
        params![member_id, wallet_id],
    )?;

    list_members(conn, wallet_id)
}

#[cfg(test)]
pub(crate) fn create_test_wallet(conn: &Connection, user: &User, name: &str, balance: Decimal) -> Wallet {
    create_wallet(
        conn,
        &WalletInput {
            name: Some(name.to_string()),
            currency: Some("IDR".to_string()),
            description: None,
            initial_balance: Some(balance),
            opened_on: NaiveDate::from_ymd_opt(2024, 1, 1),
        },
        user,
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
    )
    .unwrap()
}
