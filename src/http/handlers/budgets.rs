// Budget plans and their line items

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};

use crate::entities::budget::{self, BudgetItemInput, BudgetPlan, BudgetPlanInput, BudgetSummary};
use crate::entities::user::User;
use crate::http::{created, reply, reply_page, ApiResponse, AppState, Created, Payload, Reply};
use crate::pagination::PageRequest;
use crate::permissions::{authorize, Permission};

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(page): Query<PageRequest>,
) -> Reply<Vec<BudgetPlan>> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    reply_page(budget::list_plans(&conn, &user, page)?)
}

pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<BudgetPlan> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    reply(budget::get_plan_for(&conn, &id, &user)?)
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Payload(input): Payload<BudgetPlanInput>,
) -> Created<BudgetPlan> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    created(budget::create_plan(&conn, &input, &user)?)
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Payload(input): Payload<BudgetPlanInput>,
) -> Reply<BudgetPlan> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    reply(budget::update_plan(&conn, &id, &input, &user)?)
}

pub async fn destroy(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<()> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    budget::delete_plan(&conn, &id, &user)?;
    Ok(Json(ApiResponse::message("Rencana anggaran berhasil dihapus.")))
}

/// Planned vs actual spending per item
pub async fn summary(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<BudgetSummary> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    reply(budget::budget_summary(&conn, &id, &user)?)
}

// ============================================================================
// Items
// ============================================================================

pub async fn add_item(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Payload(input): Payload<BudgetItemInput>,
) -> Created<BudgetPlan> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    created(budget::add_item(&conn, &id, &input, &user)?)
}

pub async fn update_item(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((id, item_id)): Path<(String, String)>,
    Payload(input): Payload<BudgetItemInput>,
) -> Reply<BudgetPlan> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    reply(budget::update_item(&conn, &id, &item_id, &input, &user)?)
}

pub async fn delete_item(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((id, item_id)): Path<(String, String)>,
) -> Reply<BudgetPlan> {
    authorize(user.role, Permission::UsePersonalFinance)?;
    let conn = state.conn();
    reply(budget::delete_item(&conn, &id, &item_id, &user)?)
}
