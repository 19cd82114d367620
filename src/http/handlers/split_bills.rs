// Split bills

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};

use crate::entities::split_bill::{self, SplitBill, SplitBillInput};
use crate::entities::user::User;
use crate::http::{created, reply, reply_page, ApiResponse, AppState, Created, Payload, Reply};
use crate::pagination::PageRequest;
use crate::permissions::{authorize, Permission};

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(page): Query<PageRequest>,
) -> Reply<Vec<SplitBill>> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    reply_page(split_bill::list_bills(&conn, &user, page)?)
}

pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<SplitBill> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    reply(split_bill::get_bill_for(&conn, &id, &user)?)
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Payload(input): Payload<SplitBillInput>,
) -> Created<SplitBill> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    let bill = split_bill::create_bill(&conn, &input, &user)?;
    tracing::info!(user_id = %user.id, bill_id = %bill.id, total = %bill.breakdown.total, "split bill created");
    created(bill)
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Payload(input): Payload<SplitBillInput>,
) -> Reply<SplitBill> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    reply(split_bill::update_bill(&conn, &id, &input, &user)?)
}

pub async fn destroy(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<()> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    split_bill::delete_bill(&conn, &id, &user)?;
    Ok(Json(ApiResponse::message("Split bill berhasil dihapus.")))
}

/// POST /api/split-bills/:id/participants/:pid/paid - flips the paid flag
pub async fn toggle_paid(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((id, participant_id)): Path<(String, String)>,
) -> Reply<SplitBill> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    reply(split_bill::toggle_paid(&conn, &id, &participant_id, &user)?)
}
