// Subscription Entity - billed service instance with an approval workflow
//
// State machine:
//
//   pending ──approve──▶ approved ──cancel──▶ cancelled
//      │ └──reject───▶ rejected
//      └────cancel────▶ cancelled
//
// Price, fee and discount are snapshotted at creation so later catalog
// edits never change an existing contract.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::{self, decimal_at, enum_at, new_id};
use crate::entities::product::get_price;
use crate::entities::user::{self, User};
use crate::error::{AppError, AppResult};
use crate::pagination::{PageRequest, Paginated};
use crate::permissions::Role;
use crate::pricing;
use crate::validation::Validator;

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Approved => "approved",
            SubscriptionStatus::Rejected => "rejected",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<SubscriptionStatus> {
        match s {
            "pending" => Some(SubscriptionStatus::Pending),
            "approved" => Some(SubscriptionStatus::Approved),
            "rejected" => Some(SubscriptionStatus::Rejected),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "menunggu persetujuan",
            SubscriptionStatus::Approved => "disetujui",
            SubscriptionStatus::Rejected => "ditolak",
            SubscriptionStatus::Cancelled => "dibatalkan",
        }
    }

    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Pending, Cancelled) | (Approved, Cancelled)
        )
    }
}

// ============================================================================
// SUBSCRIPTION RESOURCE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: String,
    pub customer_id: String,
    pub customer_name: String,
    pub product_price_id: String,
    pub product_name: String,
    pub price_name: String,
    pub offer_id: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub months: u32,
    pub monthly_price: Decimal,
    pub setup_fee: Decimal,
    pub discount_percent: Decimal,
    pub status: SubscriptionStatus,
    pub notes: Option<String>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_note: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Computed display fields
    pub discounted_monthly_price: Decimal,
    pub contract_value: Decimal,
}

impl Subscription {
    /// Approved and covering `day`
    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.status == SubscriptionStatus::Approved && self.start_date <= day && day < self.end_date
    }
}

const SUBSCRIPTION_SELECT: &str = "SELECT s.id, s.customer_id, u.name, s.product_price_id, p.name, pp.name,
        s.offer_id, s.start_date, s.end_date, s.months, s.monthly_price, s.setup_fee,
        s.discount_percent, s.status, s.notes, s.decided_by, s.decided_at, s.decision_note,
        s.created_by, s.created_at, s.updated_at
     FROM subscriptions s
     JOIN users u ON u.id = s.customer_id
     JOIN product_prices pp ON pp.id = s.product_price_id
     JOIN products p ON p.id = pp.product_id";

fn subscription_from_row(row: &Row) -> rusqlite::Result<Subscription> {
    let months: u32 = row.get(9)?;
    let monthly_price = decimal_at(row, 10)?;
    let setup_fee = decimal_at(row, 11)?;
    let discount_percent = decimal_at(row, 12)?;

    Ok(Subscription {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        customer_name: row.get(2)?,
        product_price_id: row.get(3)?,
        product_name: row.get(4)?,
        price_name: row.get(5)?,
        offer_id: row.get(6)?,
        start_date: row.get(7)?,
        end_date: row.get(8)?,
        months,
        monthly_price,
        setup_fee,
        discount_percent,
        status: enum_at(row, 13, SubscriptionStatus::parse)?,
        notes: row.get(14)?,
        decided_by: row.get(15)?,
        decided_at: row.get(16)?,
        decision_note: row.get(17)?,
        created_by: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
        discounted_monthly_price: pricing::discounted_monthly(monthly_price, discount_percent),
        contract_value: pricing::contract_value(monthly_price, months, setup_fee, discount_percent),
    })
}

// ============================================================================
// INPUTS
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionInput {
    pub customer_id: Option<String>,
    pub product_price_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub months: Option<i64>,
    pub discount_percent: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionUpdateInput {
    pub start_date: Option<NaiveDate>,
    pub months: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DecisionInput {
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionFilter {
    pub status: Option<String>,
    pub customer_id: Option<String>,
}

/// Everything needed to insert a pending subscription
pub(crate) struct NewSubscription<'a> {
    pub customer_id: &'a str,
    pub product_price_id: &'a str,
    pub offer_id: Option<&'a str>,
    pub start_date: NaiveDate,
    pub months: u32,
    pub monthly_price: Decimal,
    pub setup_fee: Decimal,
    pub discount_percent: Decimal,
    pub notes: Option<String>,
    pub created_by: &'a str,
}

pub(crate) fn insert_subscription(conn: &Connection, new: &NewSubscription) -> AppResult<String> {
    let end_date = pricing::end_date(new.start_date, new.months)
        .ok_or_else(|| AppError::invalid("months", "Durasi langganan terlalu panjang."))?;
    let id = new_id();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO subscriptions (id, customer_id, product_price_id, offer_id, start_date, end_date,
            months, monthly_price, setup_fee, discount_percent, status, notes, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
        params![
            id,
            new.customer_id,
            new.product_price_id,
            new.offer_id,
            new.start_date,
            end_date,
            new.months,
            new.monthly_price.to_string(),
            new.setup_fee.to_string(),
            new.discount_percent.to_string(),
            SubscriptionStatus::Pending.as_str(),
            new.notes,
            new.created_by,
            now,
        ],
    )?;

    db::record_event(
        conn,
        "subscription.created",
        "subscription",
        &id,
        serde_json::json!({ "customer_id": new.customer_id, "offer_id": new.offer_id }),
        new.created_by,
    )?;

    Ok(id)
}

/// Shared check for forms that reference a lead or customer
pub(crate) fn check_prospect(conn: &Connection, v: &mut Validator, field: &str, label: &str, id: &str) -> AppResult<()> {
    match user::get_user(conn, id) {
        Ok(u) if matches!(u.role, Role::Lead | Role::Customer) => {}
        Ok(_) | Err(AppError::NotFound(_)) => v.not_exists(field, label),
        Err(e) => return Err(e),
    }
    Ok(())
}

fn check_months(v: &mut Validator, months: i64, min_months: u32) {
    v.min_int("months", "Durasi", months, min_months as i64);
    if months > 120 {
        v.add("months", "Durasi maksimal 120 bulan.");
    }
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn get_subscription(conn: &Connection, id: &str) -> AppResult<Subscription> {
    let sql = format!("{} WHERE s.id = ?1", SUBSCRIPTION_SELECT);
    conn.query_row(&sql, [id], subscription_from_row)
        .optional()?
        .ok_or(AppError::NotFound("Langganan"))
}

/// Customers only see their own subscriptions; others look missing.
pub fn get_subscription_for(conn: &Connection, id: &str, viewer: &User) -> AppResult<Subscription> {
    let subscription = get_subscription(conn, id)?;
    if !viewer.is_staff() && subscription.customer_id != viewer.id {
        return Err(AppError::NotFound("Langganan"));
    }
    Ok(subscription)
}

pub fn list_subscriptions(
    conn: &Connection,
    filter: &SubscriptionFilter,
    viewer: &User,
    page: PageRequest,
) -> AppResult<Paginated<Subscription>> {
    let status = match filter.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            SubscriptionStatus::parse(raw)
                .ok_or_else(|| AppError::invalid("status", "Status yang dipilih tidak valid."))?,
        ),
        None => None,
    };
    let customer_id = if viewer.is_staff() {
        filter.customer_id.clone()
    } else {
        Some(viewer.id.clone())
    };

    let filter_sql = "(?1 IS NULL OR s.status = ?1) AND (?2 IS NULL OR s.customer_id = ?2)";
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM subscriptions s WHERE {}", filter_sql),
        params![status.map(|s| s.as_str()), customer_id],
        |row| row.get(0),
    )?;

    let sql = format!(
        "{} WHERE {} ORDER BY s.created_at DESC LIMIT ?3 OFFSET ?4",
        SUBSCRIPTION_SELECT, filter_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(
            params![status.map(|s| s.as_str()), customer_id, page.limit(), page.offset()],
            subscription_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Paginated::new(items, page, total))
}

/// Staff-entered subscription (no offer). Starts pending like any other.
pub fn create_subscription(
    conn: &Connection,
    input: &SubscriptionInput,
    actor: &User,
) -> AppResult<Subscription> {
    let mut v = Validator::new();

    let customer_id = v.required_str("customer_id", "Pelanggan", input.customer_id.as_deref(), 64);
    if let Some(id) = &customer_id {
        check_prospect(conn, &mut v, "customer_id", "Pelanggan", id)?;
    }

    let price_id = v.required_str("product_price_id", "Paket harga", input.product_price_id.as_deref(), 64);
    let price = match &price_id {
        Some(id) => match get_price(conn, id) {
            Ok(price) if price.is_active => Some(price),
            Ok(_) | Err(AppError::NotFound(_)) => {
                v.not_exists("product_price_id", "Paket harga");
                None
            }
            Err(e) => return Err(e),
        },
        None => None,
    };

    let start_date = v.required("start_date", "Tanggal mulai", input.start_date);
    let months = v.required("months", "Durasi", input.months);
    if let (Some(months), Some(price)) = (months, &price) {
        check_months(&mut v, months, price.min_months);
    }
    let discount_percent = input.discount_percent.unwrap_or(Decimal::ZERO);
    v.percentage("discount_percent", "Diskon", discount_percent);
    let notes = v.optional_str("notes", "Catatan", input.notes.as_deref(), 2000);

    v.finish()?;

    let (Some(customer_id), Some(price), Some(start_date), Some(months)) =
        (customer_id, price, start_date, months)
    else {
        return Err(AppError::invalid("customer_id", "Data langganan tidak lengkap."));
    };

    let id = insert_subscription(
        conn,
        &NewSubscription {
            customer_id: &customer_id,
            product_price_id: &price.id,
            offer_id: None,
            start_date,
            months: months as u32,
            monthly_price: price.monthly_price,
            setup_fee: price.setup_fee,
            discount_percent,
            notes,
            created_by: &actor.id,
        },
    )?;

    tracing::info!(subscription_id = %id, customer_id = %customer_id, "subscription created");
    get_subscription(conn, &id)
}

/// Only pending subscriptions can be edited. Omitted fields keep their
/// stored value; an empty `notes` clears the notes.
pub fn update_subscription(
    conn: &Connection,
    id: &str,
    input: &SubscriptionUpdateInput,
) -> AppResult<Subscription> {
    let current = get_subscription(conn, id)?;
    if current.status != SubscriptionStatus::Pending {
        return Err(AppError::conflict(format!(
            "Langganan yang sudah {} tidak dapat diubah.",
            current.status.label()
        )));
    }

    let price = get_price(conn, &current.product_price_id)?;
    let mut v = Validator::new();
    let start_date = input.start_date.unwrap_or(current.start_date);
    let months = input.months.unwrap_or(i64::from(current.months));
    check_months(&mut v, months, price.min_months);
    let notes = match input.notes.as_deref() {
        Some(raw) => v.optional_str("notes", "Catatan", Some(raw), 2000),
        None => current.notes.clone(),
    };
    v.finish()?;

    let months = months as u32;
    let end_date = pricing::end_date(start_date, months)
        .ok_or_else(|| AppError::invalid("months", "Durasi langganan terlalu panjang."))?;

    conn.execute(
        "UPDATE subscriptions SET start_date = ?2, end_date = ?3, months = ?4, notes = ?5, updated_at = ?6
         WHERE id = ?1",
        params![id, start_date, end_date, months, notes, Utc::now()],
    )?;

    get_subscription(conn, id)
}

fn transition(
    conn: &Connection,
    id: &str,
    next: SubscriptionStatus,
    actor: &User,
    note: Option<String>,
) -> AppResult<Subscription> {
    let current = get_subscription(conn, id)?;
    if !current.status.can_transition_to(next) {
        return Err(AppError::conflict(format!(
            "Langganan berstatus {} tidak dapat diubah menjadi {}.",
            current.status.label(),
            next.label()
        )));
    }

    let tx = conn.unchecked_transaction()?;
    let now = Utc::now();
    // Status guard in the WHERE clause keeps a racing decision from
    // overwriting this one.
    let changed = tx.execute(
        "UPDATE subscriptions SET status = ?2, decided_by = ?3, decided_at = ?4, decision_note = ?5, updated_at = ?4
         WHERE id = ?1 AND status = ?6",
        params![id, next.as_str(), actor.id, now, note, current.status.as_str()],
    )?;
    if changed == 0 {
        return Err(AppError::conflict("Status langganan sudah berubah, silakan muat ulang."));
    }

    if next == SubscriptionStatus::Approved {
        user::promote_to_customer(&tx, &current.customer_id, &actor.id)?;
    }

    db::record_event(
        &tx,
        &format!("subscription.{}", next.as_str()),
        "subscription",
        id,
        serde_json::json!({
            "from": current.status.as_str(),
            "to": next.as_str(),
            "note": note,
        }),
        &actor.id,
    )?;
    tx.commit()?;

    tracing::info!(
        subscription_id = %id,
        from = current.status.as_str(),
        to = next.as_str(),
        actor = %actor.id,
        "subscription status changed"
    );

    get_subscription(conn, id)
}

/// Approve a pending subscription; a lead customer becomes a customer.
pub fn approve_subscription(conn: &Connection, id: &str, actor: &User, input: &DecisionInput) -> AppResult<Subscription> {
    let mut v = Validator::new();
    let note = v.optional_str("note", "Catatan", input.note.as_deref(), 2000);
    v.finish()?;
    transition(conn, id, SubscriptionStatus::Approved, actor, note)
}

/// Reject a pending subscription; a reason is mandatory.
pub fn reject_subscription(conn: &Connection, id: &str, actor: &User, input: &DecisionInput) -> AppResult<Subscription> {
    let mut v = Validator::new();
    let note = v.required_str("note", "Alasan penolakan", input.note.as_deref(), 2000);
    v.finish()?;
    transition(conn, id, SubscriptionStatus::Rejected, actor, note)
}

pub fn cancel_subscription(conn: &Connection, id: &str, actor: &User, input: &DecisionInput) -> AppResult<Subscription> {
    let mut v = Validator::new();
    let note = v.optional_str("note", "Alasan pembatalan", input.note.as_deref(), 2000);
    v.finish()?;
    transition(conn, id, SubscriptionStatus::Cancelled, actor, note)
}

/// Approved or cancelled subscriptions are part of the billing history and stay.
pub fn delete_subscription(conn: &Connection, id: &str) -> AppResult<()> {
    let current = get_subscription(conn, id)?;
    if !matches!(current.status, SubscriptionStatus::Pending | SubscriptionStatus::Rejected) {
        return Err(AppError::conflict(format!(
            "Langganan yang sudah {} tidak dapat dihapus.",
            current.status.label()
        )));
    }
    conn.execute("UPDATE offers SET subscription_id = NULL WHERE subscription_id = ?1", [id])?;
    conn.execute("DELETE FROM subscriptions WHERE id = ?1", [id])?;
    Ok(())
}

pub fn count_by_status(conn: &Connection, status: SubscriptionStatus) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM subscriptions WHERE status = ?1",
        [status.as_str()],
        |row| row.get(0),
    )?)
}

/// Sum of discounted monthly prices of subscriptions active on `day`
pub fn monthly_recurring_revenue(conn: &Connection, day: NaiveDate) -> AppResult<Decimal> {
    let mut stmt = conn.prepare(
        "SELECT monthly_price, discount_percent FROM subscriptions
         WHERE status = ?1 AND start_date <= ?2 AND end_date > ?2",
    )?;
    let rows = stmt
        .query_map(params![SubscriptionStatus::Approved.as_str(), day], |row| {
            Ok((decimal_at(row, 0)?, decimal_at(row, 1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .map(|(price, discount)| pricing::discounted_monthly(price, discount))
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_events_for_entity, test_connection};
    use crate::entities::product::create_test_price;
    use crate::entities::user::create_test_user;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup(conn: &Connection) -> (User, User, User, String) {
        let admin = create_test_user(conn, "Admin", Role::Admin);
        let sales = create_test_user(conn, "Sales", Role::Sales);
        let lead = create_test_user(conn, "Lead", Role::Lead);
        let price = create_test_price(conn, dec!(300000), dec!(500000), 6);
        (admin, sales, lead, price.id)
    }

    fn input(customer_id: &str, price_id: &str, months: i64) -> SubscriptionInput {
        SubscriptionInput {
            customer_id: Some(customer_id.to_string()),
            product_price_id: Some(price_id.to_string()),
            start_date: Some(date(2024, 1, 15)),
            months: Some(months),
            discount_percent: None,
            notes: None,
        }
    }

    #[test]
    fn test_status_transitions() {
        use SubscriptionStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Cancelled));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Cancelled.can_transition_to(Approved));
    }

    #[test]
    fn test_create_snapshots_price_and_computes_totals() {
        let conn = test_connection();
        let (_, sales, lead, price_id) = setup(&conn);

        let sub = create_subscription(&conn, &input(&lead.id, &price_id, 12), &sales).unwrap();

        assert_eq!(sub.status, SubscriptionStatus::Pending);
        assert_eq!(sub.end_date, date(2025, 1, 15));
        assert_eq!(sub.monthly_price, dec!(300000));
        // 300000 × 12 + 500000
        assert_eq!(sub.contract_value, dec!(4100000));
        assert_eq!(sub.customer_name, "Lead");
        assert_eq!(sub.created_by, sales.id);
    }

    #[test]
    fn test_months_below_plan_minimum_rejected() {
        let conn = test_connection();
        let (_, sales, lead, price_id) = setup(&conn);

        let err = create_subscription(&conn, &input(&lead.id, &price_id, 3), &sales).unwrap_err();
        match err {
            AppError::Validation(errors) => assert_eq!(errors.get("months").unwrap()[0], "Durasi minimal 6."),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_customer_must_be_lead_or_customer() {
        let conn = test_connection();
        let (admin, sales, _, price_id) = setup(&conn);

        let err = create_subscription(&conn, &input(&admin.id, &price_id, 6), &sales).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.has("customer_id")));
    }

    #[test]
    fn test_approve_converts_lead_and_logs_event() {
        let conn = test_connection();
        let (admin, sales, lead, price_id) = setup(&conn);
        let sub = create_subscription(&conn, &input(&lead.id, &price_id, 6), &sales).unwrap();

        let approved = approve_subscription(&conn, &sub.id, &admin, &DecisionInput::default()).unwrap();
        assert_eq!(approved.status, SubscriptionStatus::Approved);
        assert_eq!(approved.decided_by.as_deref(), Some(admin.id.as_str()));

        let customer = user::get_user(&conn, &lead.id).unwrap();
        assert_eq!(customer.role, Role::Customer);

        let events = get_events_for_entity(&conn, "subscription", &sub.id).unwrap();
        let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["subscription.created", "subscription.approved"]);
    }

    #[test]
    fn test_reject_requires_reason_and_blocks_approval() {
        let conn = test_connection();
        let (admin, sales, lead, price_id) = setup(&conn);
        let sub = create_subscription(&conn, &input(&lead.id, &price_id, 6), &sales).unwrap();

        let err = reject_subscription(&conn, &sub.id, &admin, &DecisionInput::default()).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.has("note")));

        let rejected = reject_subscription(
            &conn,
            &sub.id,
            &admin,
            &DecisionInput { note: Some("Area belum terjangkau".to_string()) },
        )
        .unwrap();
        assert_eq!(rejected.status, SubscriptionStatus::Rejected);
        assert_eq!(rejected.decision_note.as_deref(), Some("Area belum terjangkau"));

        let err = approve_subscription(&conn, &sub.id, &admin, &DecisionInput::default()).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // Lead stays a lead
        assert_eq!(user::get_user(&conn, &lead.id).unwrap().role, Role::Lead);
    }

    #[test]
    fn test_update_only_while_pending() {
        let conn = test_connection();
        let (admin, sales, lead, price_id) = setup(&conn);
        let sub = create_subscription(&conn, &input(&lead.id, &price_id, 6), &sales).unwrap();

        let updated = update_subscription(
            &conn,
            &sub.id,
            &SubscriptionUpdateInput {
                start_date: Some(date(2024, 2, 1)),
                months: Some(24),
                notes: Some("Diperpanjang".to_string()),
            },
        )
        .unwrap();
        assert_eq!(updated.end_date, date(2026, 2, 1));
        assert_eq!(updated.months, 24);

        approve_subscription(&conn, &sub.id, &admin, &DecisionInput::default()).unwrap();
        let err = update_subscription(
            &conn,
            &sub.id,
            &SubscriptionUpdateInput {
                start_date: Some(date(2024, 2, 1)),
                months: Some(6),
                notes: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = delete_subscription(&conn, &sub.id).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_partial_update_keeps_omitted_fields() {
        let conn = test_connection();
        let (_, sales, lead, price_id) = setup(&conn);
        let mut create = input(&lead.id, &price_id, 6);
        create.notes = Some("Lantai 2".to_string());
        let sub = create_subscription(&conn, &create, &sales).unwrap();

        let moved = update_subscription(
            &conn,
            &sub.id,
            &SubscriptionUpdateInput { start_date: Some(date(2024, 5, 1)), ..Default::default() },
        )
        .unwrap();
        assert_eq!(moved.months, 6);
        assert_eq!(moved.end_date, date(2024, 11, 1));
        assert_eq!(moved.notes.as_deref(), Some("Lantai 2"));

        let longer = update_subscription(
            &conn,
            &sub.id,
            &SubscriptionUpdateInput { months: Some(12), notes: Some(String::new()), ..Default::default() },
        )
        .unwrap();
        assert_eq!(longer.start_date, date(2024, 5, 1));
        assert_eq!(longer.end_date, date(2025, 5, 1));
        assert_eq!(longer.notes, None);

        let err = update_subscription(
            &conn,
            &sub.id,
            &SubscriptionUpdateInput { months: Some(0), ..Default::default() },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_customer_sees_only_own() {
        let conn = test_connection();
        let (_, sales, lead, price_id) = setup(&conn);
        let other = create_test_user(&conn, "Other Lead", Role::Lead);
        create_subscription(&conn, &input(&lead.id, &price_id, 6), &sales).unwrap();
        let theirs = create_subscription(&conn, &input(&other.id, &price_id, 6), &sales).unwrap();

        let own = list_subscriptions(&conn, &SubscriptionFilter::default(), &lead, PageRequest::default()).unwrap();
        assert_eq!(own.meta.total, 1);

        let all = list_subscriptions(&conn, &SubscriptionFilter::default(), &sales, PageRequest::default()).unwrap();
        assert_eq!(all.meta.total, 2);

        assert!(matches!(
            get_subscription_for(&conn, &theirs.id, &lead),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_monthly_recurring_revenue() {
        let conn = test_connection();
        let (admin, sales, lead, price_id) = setup(&conn);

        let mut discounted = input(&lead.id, &price_id, 6);
        discounted.discount_percent = Some(dec!(10));
        let a = create_subscription(&conn, &discounted, &sales).unwrap();
        let b = create_subscription(&conn, &input(&lead.id, &price_id, 6), &sales).unwrap();
        create_subscription(&conn, &input(&lead.id, &price_id, 6), &sales).unwrap();

        approve_subscription(&conn, &a.id, &admin, &DecisionInput::default()).unwrap();
        approve_subscription(&conn, &b.id, &admin, &DecisionInput::default()).unwrap();

        // 270000 + 300000, the pending one does not count
        assert_eq!(monthly_recurring_revenue(&conn, date(2024, 3, 1)).unwrap(), dec!(570000));
        // Outside the contract period
        assert_eq!(monthly_recurring_revenue(&conn, date(2025, 3, 1)).unwrap(), Decimal::ZERO);
        assert_eq!(count_by_status(&conn, SubscriptionStatus::Pending).unwrap(), 1);
    }
}
