// Wallets, their members and the transaction ledger

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::entities::transaction::{
    self, Transfer, TransactionFilter, TransactionInput, TransferInput, WalletSummary, WalletTransaction,
};
use crate::entities::user::User;
use crate::entities::wallet::{self, MemberInput, Wallet, WalletInput, WalletMember, WalletUpdateInput};
use crate::error::AppError;
use crate::http::{created, reply, reply_page, ApiResponse, AppState, Created, Payload, Reply};
use crate::import::{self, ImportReport};
use crate::pagination::PageRequest;
use crate::permissions::{authorize, Permission};
use crate::pricing;

#[derive(Debug, Default, Deserialize)]
pub struct SummaryQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

// ============================================================================
// Wallets
// ============================================================================

pub async fn list(State(state): State<AppState>, Extension(user): Extension<User>) -> Reply<Vec<Wallet>> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    reply(wallet::list_wallets(&conn, &user)?)
}

pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<Wallet> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    reply(wallet::get_wallet_for(&conn, &id, &user)?)
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Payload(input): Payload<WalletInput>,
) -> Created<Wallet> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    let wallet = wallet::create_wallet(&conn, &input, &user, pricing::today())?;
    tracing::info!(user_id = %user.id, wallet_id = %wallet.id, "wallet created");
    created(wallet)
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Payload(input): Payload<WalletUpdateInput>,
) -> Reply<Wallet> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    reply(wallet::update_wallet(&conn, &id, &input, &user)?)
}

pub async fn destroy(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<()> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    wallet::delete_wallet(&conn, &id, &user)?;
    tracing::info!(user_id = %user.id, wallet_id = %id, "wallet deleted");
    Ok(Json(ApiResponse::message("Dompet berhasil dihapus.")))
}

// ============================================================================
// Members
// ============================================================================

pub async fn members(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<Vec<WalletMember>> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    let wallet = wallet::get_wallet_for(&conn, &id, &user)?;
    reply(wallet::list_members(&conn, &wallet.id)?)
}

pub async fn add_member(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Payload(input): Payload<MemberInput>,
) -> Created<Vec<WalletMember>> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    created(wallet::add_member(&conn, &id, &input, &user)?)
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((id, member_id)): Path<(String, String)>,
) -> Reply<Vec<WalletMember>> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    reply(wallet::remove_member(&conn, &id, &member_id, &user)?)
}

// ============================================================================
// Ledger
// ============================================================================

pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Query(page): Query<PageRequest>,
    Query(filter): Query<TransactionFilter>,
) -> Reply<Vec<WalletTransaction>> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    let wallet = wallet::get_wallet_for(&conn, &id, &user)?;
    reply_page(transaction::list_transactions(&conn, &wallet, &filter, page)?)
}

pub async fn record_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Payload(input): Payload<TransactionInput>,
) -> Created<WalletTransaction> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    let wallet = wallet::get_wallet_for(&conn, &id, &user)?;
    let entry = transaction::record_transaction(&conn, &wallet, &input, &user, pricing::today())?;
    tracing::debug!(wallet_id = %wallet.id, transaction_id = %entry.id, kind = entry.kind.as_str(), "transaction recorded");
    created(entry)
}

pub async fn summary(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Query(query): Query<SummaryQuery>,
) -> Reply<WalletSummary> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    if let (Some(from), Some(to)) = (query.from, query.to) {
        if to < from {
            return Err(AppError::invalid("to", "Tanggal akhir tidak boleh sebelum tanggal awal."));
        }
    }
    let conn = state.conn();
    let wallet = wallet::get_wallet_for(&conn, &id, &user)?;
    reply(transaction::wallet_summary(&conn, &wallet, query.from, query.to)?)
}

/// POST /api/wallets/:id/import - raw CSV body (`date,description,amount[,category]`)
pub async fn import_csv(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    body: String,
) -> Reply<ImportReport> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    if body.trim().is_empty() {
        return Err(AppError::BadRequest("file CSV kosong".to_string()));
    }
    let conn = state.conn();
    let wallet = wallet::get_wallet_for(&conn, &id, &user)?;
    reply(import::import_transactions(&conn, &wallet, &user, body.as_bytes())?)
}

pub async fn transfer(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Payload(input): Payload<TransferInput>,
) -> Created<Transfer> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    let transfer = transaction::transfer(&conn, &input, &user, pricing::today())?;
    tracing::info!(user_id = %user.id, transfer_id = %transfer.transfer_id, "transfer recorded");
    created(transfer)
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<()> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    transaction::delete_transaction(&conn, &id, &user)?;
    Ok(Json(ApiResponse::message("Transaksi berhasil dihapus.")))
}
