// Budget Entity - spending plans over a date period
//
// A plan owns items; each item budgets an amount for an expense category.
// Actuals come from the owner's expense transactions in the plan period.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::{decimal_at, new_id};
use crate::entities::category::{check_category_kind, CategoryKind};
use crate::entities::user::User;
use crate::error::{AppError, AppResult};
use crate::pagination::{PageRequest, Paginated};
use crate::pricing;
use crate::validation::Validator;

// ============================================================================
// RESOURCES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetItem {
    pub id: String,
    pub budget_plan_id: String,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub name: String,
    pub planned_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BudgetPlan {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<BudgetItem>,
    pub total_planned: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BudgetPlanInput {
    pub name: Option<String>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BudgetItemInput {
    pub name: Option<String>,
    pub category_id: Option<String>,
    pub planned_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BudgetItemSummary {
    pub item_id: String,
    pub name: String,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub planned: Decimal,
    pub actual: Decimal,
    /// planned − actual; negative when overspent
    pub remaining: Decimal,
    pub usage_percent: Option<Decimal>,
    pub over_budget: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BudgetSummary {
    pub budget_plan_id: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub items: Vec<BudgetItemSummary>,
    pub total_planned: Decimal,
    pub total_actual: Decimal,
    pub total_remaining: Decimal,
    /// Expenses in the period whose category no item budgets for
    pub unbudgeted_spending: Decimal,
}

fn item_from_row(row: &Row) -> rusqlite::Result<BudgetItem> {
    Ok(BudgetItem {
        id: row.get(0)?,
        budget_plan_id: row.get(1)?,
        category_id: row.get(2)?,
        category_name: row.get(3)?,
        name: row.get(4)?,
        planned_amount: decimal_at(row, 5)?,
        created_at: row.get(6)?,
    })
}

fn plan_from_row(row: &Row) -> rusqlite::Result<BudgetPlan> {
    Ok(BudgetPlan {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        period_start: row.get(3)?,
        period_end: row.get(4)?,
        notes: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        items: Vec::new(),
        total_planned: Decimal::ZERO,
    })
}

const PLAN_COLUMNS: &str = "id, user_id, name, period_start, period_end, notes, created_at, updated_at";

fn load_items(conn: &Connection, plan: &mut BudgetPlan) -> AppResult<()> {
    let mut stmt = conn.prepare(
        "SELECT i.id, i.budget_plan_id, i.category_id, c.name, i.name, i.planned_amount, i.created_at
         FROM budget_items i
         LEFT JOIN categories c ON c.id = i.category_id
         WHERE i.budget_plan_id = ?1
         ORDER BY i.created_at ASC, i.name ASC",
    )?;
    plan.items = stmt
        .query_map([&plan.id], item_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    plan.total_planned = plan.items.iter().map(|i| i.planned_amount).sum();
    Ok(())
}

// ============================================================================
// PLANS
// ============================================================================

/// Plans are private; someone else's plan reads as missing.
pub fn get_plan_for(conn: &Connection, id: &str, user: &User) -> AppResult<BudgetPlan> {
    let sql = format!("SELECT {} FROM budget_plans WHERE id = ?1 AND user_id = ?2", PLAN_COLUMNS);
    let mut plan = conn
        .query_row(&sql, params![id, user.id], plan_from_row)
        .optional()?
        .ok_or(AppError::NotFound("Rencana anggaran"))?;
    load_items(conn, &mut plan)?;
    Ok(plan)
}

pub fn list_plans(conn: &Connection, user: &User, page: PageRequest) -> AppResult<Paginated<BudgetPlan>> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM budget_plans WHERE user_id = ?1",
        [&user.id],
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM budget_plans WHERE user_id = ?1
         ORDER BY period_start DESC, name ASC LIMIT ?2 OFFSET ?3",
        PLAN_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut plans = stmt
        .query_map(params![user.id, page.limit(), page.offset()], plan_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    for plan in &mut plans {
        load_items(conn, plan)?;
    }

    Ok(Paginated::new(plans, page, total))
}

struct ValidPlan {
    name: String,
    period_start: NaiveDate,
    period_end: NaiveDate,
    notes: Option<String>,
}

fn validate_plan(input: &BudgetPlanInput) -> AppResult<ValidPlan> {
    let mut v = Validator::new();
    let name = v.required_str("name", "Nama anggaran", input.name.as_deref(), 255);
    let period_start = v.required("period_start", "Tanggal mulai", input.period_start);
    let period_end = v.required("period_end", "Tanggal akhir", input.period_end);
    if let (Some(start), Some(end)) = (period_start, period_end) {
        v.date_not_before("period_end", "Tanggal akhir", end, start, "tanggal mulai");
    }
    let notes = v.optional_str("notes", "Catatan", input.notes.as_deref(), 1000);
    v.finish()?;

    let (Some(name), Some(period_start), Some(period_end)) = (name, period_start, period_end) else {
        return Err(AppError::invalid("name", "Data anggaran tidak lengkap."));
    };
    Ok(ValidPlan { name, period_start, period_end, notes })
}

pub fn create_plan(conn: &Connection, input: &BudgetPlanInput, user: &User) -> AppResult<BudgetPlan> {
    let valid = validate_plan(input)?;
    let id = new_id();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO budget_plans (id, user_id, name, period_start, period_end, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![id, user.id, valid.name, valid.period_start, valid.period_end, valid.notes, now],
    )?;

    get_plan_for(conn, &id, user)
}

pub fn update_plan(conn: &Connection, id: &str, input: &BudgetPlanInput, user: &User) -> AppResult<BudgetPlan> {
    get_plan_for(conn, id, user)?;
    let valid = validate_plan(input)?;

    conn.execute(
        "UPDATE budget_plans SET name = ?2, period_start = ?3, period_end = ?4, notes = ?5, updated_at = ?6
         WHERE id = ?1",
        params![id, valid.name, valid.period_start, valid.period_end, valid.notes, Utc::now()],
    )?;

    get_plan_for(conn, id, user)
}

pub fn delete_plan(conn: &Connection, id: &str, user: &User) -> AppResult<()> {
    get_plan_for(conn, id, user)?;
    conn.execute("DELETE FROM budget_plans WHERE id = ?1", [id])?;
    Ok(())
}

// ============================================================================
// ITEMS
// ============================================================================

struct ValidItem {
    name: String,
    category_id: Option<String>,
    planned_amount: Decimal,
}

fn validate_item(conn: &Connection, input: &BudgetItemInput) -> AppResult<ValidItem> {
    let mut v = Validator::new();
    let name = v.required_str("name", "Nama pos anggaran", input.name.as_deref(), 255);
    let planned_amount = v
        .required("planned_amount", "Jumlah anggaran", input.planned_amount)
        .map(pricing::round_money);
    if let Some(amount) = planned_amount {
        v.non_negative("planned_amount", "Jumlah anggaran", amount);
        v.max_amount("planned_amount", "Jumlah anggaran", amount);
    }
    let category_id = input
        .category_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    if let Some(id) = &category_id {
        check_category_kind(conn, &mut v, "category_id", id, CategoryKind::Expense)?;
    }
    v.finish()?;

    let (Some(name), Some(planned_amount)) = (name, planned_amount) else {
        return Err(AppError::invalid("name", "Data pos anggaran tidak lengkap."));
    };
    Ok(ValidItem { name, category_id, planned_amount })
}

pub fn add_item(conn: &Connection, plan_id: &str, input: &BudgetItemInput, user: &User) -> AppResult<BudgetPlan> {
    get_plan_for(conn, plan_id, user)?;
    let valid = validate_item(conn, input)?;

    conn.execute(
        "INSERT INTO budget_items (id, budget_plan_id, category_id, name, planned_amount, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new_id(),
            plan_id,
            valid.category_id,
            valid.name,
            valid.planned_amount.to_string(),
            Utc::now()
        ],
    )?;

    get_plan_for(conn, plan_id, user)
}

fn require_item(plan: &BudgetPlan, item_id: &str) -> AppResult<()> {
    if plan.items.iter().any(|i| i.id == item_id) {
        Ok(())
    } else {
        Err(AppError::NotFound("Pos anggaran"))
    }
}

pub fn update_item(
    conn: &Connection,
    plan_id: &str,
    item_id: &str,
    input: &BudgetItemInput,
    user: &User,
) -> AppResult<BudgetPlan> {
    require_item(&get_plan_for(conn, plan_id, user)?, item_id)?;
    let valid = validate_item(conn, input)?;

    conn.execute(
        "UPDATE budget_items SET category_id = ?2, name = ?3, planned_amount = ?4 WHERE id = ?1",
        params![item_id, valid.category_id, valid.name, valid.planned_amount.to_string()],
    )?;

    get_plan_for(conn, plan_id, user)
}

pub fn delete_item(conn: &Connection, plan_id: &str, item_id: &str, user: &User) -> AppResult<BudgetPlan> {
    require_item(&get_plan_for(conn, plan_id, user)?, item_id)?;
    conn.execute("DELETE FROM budget_items WHERE id = ?1", [item_id])?;
    get_plan_for(conn, plan_id, user)
}

// ============================================================================
// SUMMARY
// ============================================================================

/// `actual / planned` as a percentage. `None` for an empty plan line or a
/// ratio too large to represent.
pub fn usage_percent(actual: Decimal, planned: Decimal) -> Option<Decimal> {
    if planned.is_zero() {
        return None;
    }
    actual
        .checked_div(planned)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .map(pricing::round_money)
}

/// Planned vs actual for every item. Several items may share a category;
/// each of them reports the category's full actual spending.
pub fn budget_summary(conn: &Connection, plan_id: &str, user: &User) -> AppResult<BudgetSummary> {
    let plan = get_plan_for(conn, plan_id, user)?;

    let mut stmt = conn.prepare(
        "SELECT category_id, amount FROM transactions
         WHERE user_id = ?1 AND kind = 'expense'
           AND transaction_date >= ?2 AND transaction_date <= ?3",
    )?;
    let expenses = stmt
        .query_map(params![plan.user_id, plan.period_start, plan.period_end], |row| {
            Ok((row.get::<_, Option<String>>(0)?, decimal_at(row, 1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut by_category: HashMap<Option<String>, Decimal> = HashMap::new();
    for (category_id, amount) in expenses {
        let spent = by_category.entry(category_id).or_default();
        *spent = spent.saturating_add(amount);
    }

    let mut items = Vec::with_capacity(plan.items.len());
    for item in &plan.items {
        let actual = match &item.category_id {
            Some(id) => by_category.get(&Some(id.clone())).copied().unwrap_or_default(),
            None => Decimal::ZERO,
        };
        let usage_percent = usage_percent(actual, item.planned_amount);
        items.push(BudgetItemSummary {
            item_id: item.id.clone(),
            name: item.name.clone(),
            category_id: item.category_id.clone(),
            category_name: item.category_name.clone(),
            planned: item.planned_amount,
            actual,
            remaining: item.planned_amount - actual,
            usage_percent,
            over_budget: actual > item.planned_amount,
        });
    }

    let budgeted: Vec<&String> = plan.items.iter().filter_map(|i| i.category_id.as_ref()).collect();
    let unbudgeted_spending = by_category
        .iter()
        .filter(|(category, _)| match category {
            Some(id) => !budgeted.contains(&id),
            None => true,
        })
        .map(|(_, amount)| *amount)
        .sum();

    let mut counted: Vec<&String> = Vec::new();
    let mut total_actual = Decimal::ZERO;
    for id in budgeted {
        if !counted.contains(&id) {
            total_actual += by_category.get(&Some(id.clone())).copied().unwrap_or_default();
            counted.push(id);
        }
    }

    Ok(BudgetSummary {
        budget_plan_id: plan.id.clone(),
        period_start: plan.period_start,
        period_end: plan.period_end,
        items,
        total_planned: plan.total_planned,
        total_actual,
        total_remaining: plan.total_planned - total_actual,
        unbudgeted_spending,
    })
}
