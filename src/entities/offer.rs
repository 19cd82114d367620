// Offer Entity - a proposed product/price bundle awaiting the lead's answer
//
// Accepting a pending offer creates a pending subscription from the offer's
// price snapshot; the subscription then goes through manager approval.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::{self, decimal_at, enum_at, new_id};
use crate::entities::product::get_price;
use crate::entities::subscription::{self, check_prospect, NewSubscription, Subscription};
use crate::entities::user::User;
use crate::error::{AppError, AppResult};
use crate::pagination::{PageRequest, Paginated};
use crate::pricing;
use crate::validation::Validator;

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<OfferStatus> {
        match s {
            "pending" => Some(OfferStatus::Pending),
            "accepted" => Some(OfferStatus::Accepted),
            "rejected" => Some(OfferStatus::Rejected),
            "expired" => Some(OfferStatus::Expired),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "menunggu jawaban",
            OfferStatus::Accepted => "diterima",
            OfferStatus::Rejected => "ditolak",
            OfferStatus::Expired => "kedaluwarsa",
        }
    }
}

// ============================================================================
// OFFER RESOURCE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    pub id: String,
    pub lead_id: String,
    pub lead_name: String,
    pub sales_id: String,
    pub sales_name: String,
    pub product_price_id: String,
    pub product_name: String,
    pub price_name: String,
    pub monthly_price: Decimal,
    pub setup_fee: Decimal,
    pub months: u32,
    pub discount_percent: Decimal,
    pub valid_until: NaiveDate,
    pub status: OfferStatus,
    pub notes: Option<String>,
    pub response_note: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Computed display fields
    pub discounted_monthly_price: Decimal,
    pub contract_value: Decimal,
}

impl Offer {
    /// Still pending but past its validity date
    pub fn is_expired_on(&self, day: NaiveDate) -> bool {
        self.status == OfferStatus::Pending && self.valid_until < day
    }
}

const OFFER_SELECT: &str = "SELECT o.id, o.lead_id, l.name, o.sales_id, s.name, o.product_price_id,
        p.name, pp.name, o.monthly_price, o.setup_fee, o.months, o.discount_percent, o.valid_until,
        o.status, o.notes, o.response_note, o.responded_at, o.subscription_id, o.created_at, o.updated_at
     FROM offers o
     JOIN users l ON l.id = o.lead_id
     JOIN users s ON s.id = o.sales_id
     JOIN product_prices pp ON pp.id = o.product_price_id
     JOIN products p ON p.id = pp.product_id";

fn offer_from_row(row: &Row) -> rusqlite::Result<Offer> {
    let monthly_price = decimal_at(row, 8)?;
    let setup_fee = decimal_at(row, 9)?;
    let months: u32 = row.get(10)?;
    let discount_percent = decimal_at(row, 11)?;

    Ok(Offer {
        id: row.get(0)?,
        lead_id: row.get(1)?,
        lead_name: row.get(2)?,
        sales_id: row.get(3)?,
        sales_name: row.get(4)?,
        product_price_id: row.get(5)?,
        product_name: row.get(6)?,
        price_name: row.get(7)?,
        monthly_price,
        setup_fee,
        months,
        discount_percent,
        valid_until: row.get(12)?,
        status: enum_at(row, 13, OfferStatus::parse)?,
        notes: row.get(14)?,
        response_note: row.get(15)?,
        responded_at: row.get(16)?,
        subscription_id: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
        discounted_monthly_price: pricing::discounted_monthly(monthly_price, discount_percent),
        contract_value: pricing::contract_value(monthly_price, months, setup_fee, discount_percent),
    })
}

// ============================================================================
// INPUTS
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfferInput {
    pub lead_id: Option<String>,
    pub product_price_id: Option<String>,
    pub months: Option<i64>,
    pub discount_percent: Option<Decimal>,
    pub valid_until: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcceptOfferInput {
    /// Defaults to today
    pub start_date: Option<NaiveDate>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RejectOfferInput {
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfferFilter {
    pub status: Option<String>,
    pub lead_id: Option<String>,
}

struct ValidOffer {
    lead_id: String,
    product_price_id: String,
    monthly_price: Decimal,
    setup_fee: Decimal,
    months: u32,
    discount_percent: Decimal,
    valid_until: NaiveDate,
    notes: Option<String>,
}

fn validate(conn: &Connection, input: &OfferInput, today: NaiveDate) -> AppResult<ValidOffer> {
    let mut v = Validator::new();

    let lead_id = v.required_str("lead_id", "Lead", input.lead_id.as_deref(), 64);
    if let Some(id) = &lead_id {
        check_prospect(conn, &mut v, "lead_id", "Lead", id)?;
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

    let months = v.required("months", "Durasi", input.months);
    if let Some(months) = months {
        let minimum = price.as_ref().map(|p| p.min_months as i64).unwrap_or(1);
        v.min_int("months", "Durasi", months, minimum);
        if months > 120 {
            v.add("months", "Durasi maksimal 120 bulan.");
        }
    }

    let discount_percent = input.discount_percent.unwrap_or(Decimal::ZERO);
    v.percentage("discount_percent", "Diskon", discount_percent);

    let valid_until = v.required("valid_until", "Berlaku sampai", input.valid_until);
    if let Some(valid_until) = valid_until {
        v.date_not_before("valid_until", "Berlaku sampai", valid_until, today, "hari ini");
    }
    let notes = v.optional_str("notes", "Catatan", input.notes.as_deref(), 2000);

    v.finish()?;

    let (Some(lead_id), Some(price), Some(months), Some(valid_until)) =
        (lead_id, price, months, valid_until)
    else {
        return Err(AppError::invalid("lead_id", "Data penawaran tidak lengkap."));
    };

    Ok(ValidOffer {
        lead_id,
        product_price_id: price.id,
        monthly_price: price.monthly_price,
        setup_fee: price.setup_fee,
        months: months as u32,
        discount_percent,
        valid_until,
        notes,
    })
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn get_offer(conn: &Connection, id: &str) -> AppResult<Offer> {
    let sql = format!("{} WHERE o.id = ?1", OFFER_SELECT);
    conn.query_row(&sql, [id], offer_from_row)
        .optional()?
        .ok_or(AppError::NotFound("Penawaran"))
}

/// Leads and customers only see offers addressed to them.
pub fn get_offer_for(conn: &Connection, id: &str, viewer: &User) -> AppResult<Offer> {
    let offer = get_offer(conn, id)?;
    if !viewer.is_staff() && offer.lead_id != viewer.id {
        return Err(AppError::NotFound("Penawaran"));
    }
    Ok(offer)
}

pub fn list_offers(
    conn: &Connection,
    filter: &OfferFilter,
    viewer: &User,
    page: PageRequest,
) -> AppResult<Paginated<Offer>> {
    let status = match filter.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            OfferStatus::parse(raw)
                .ok_or_else(|| AppError::invalid("status", "Status yang dipilih tidak valid."))?,
        ),
        None => None,
    };
    let lead_id = if viewer.is_staff() {
        filter.lead_id.clone()
    } else {
        Some(viewer.id.clone())
    };

    let filter_sql = "(?1 IS NULL OR o.status = ?1) AND (?2 IS NULL OR o.lead_id = ?2)";
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM offers o WHERE {}", filter_sql),
        params![status.map(|s| s.as_str()), lead_id],
        |row| row.get(0),
    )?;

    let sql = format!(
        "{} WHERE {} ORDER BY o.created_at DESC LIMIT ?3 OFFSET ?4",
        OFFER_SELECT, filter_sql
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(
            params![status.map(|s| s.as_str()), lead_id, page.limit(), page.offset()],
            offer_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Paginated::new(items, page, total))
}

pub fn create_offer(conn: &Connection, input: &OfferInput, sales: &User, today: NaiveDate) -> AppResult<Offer> {
    let valid = validate(conn, input, today)?;
    let id = new_id();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO offers (id, lead_id, sales_id, product_price_id, monthly_price, setup_fee, months,
            discount_percent, valid_until, status, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
        params![
            id,
            valid.lead_id,
            sales.id,
            valid.product_price_id,
            valid.monthly_price.to_string(),
            valid.setup_fee.to_string(),
            valid.months,
            valid.discount_percent.to_string(),
            valid.valid_until,
            OfferStatus::Pending.as_str(),
            valid.notes,
            now,
        ],
    )?;

    tracing::info!(offer_id = %id, lead_id = %valid.lead_id, sales_id = %sales.id, "offer created");
    get_offer(conn, &id)
}

fn ensure_pending(offer: &Offer, action: &str) -> AppResult<()> {
    if offer.status != OfferStatus::Pending {
        return Err(AppError::conflict(format!(
            "Penawaran yang sudah {} tidak dapat {}.",
            offer.status.label(),
            action
        )));
    }
    Ok(())
}

/// Re-pricing a pending offer takes a fresh snapshot of the chosen plan.
pub fn update_offer(conn: &Connection, id: &str, input: &OfferInput, today: NaiveDate) -> AppResult<Offer> {
    let offer = get_offer(conn, id)?;
    ensure_pending(&offer, "diubah")?;
    let valid = validate(conn, input, today)?;

    conn.execute(
        "UPDATE offers SET lead_id = ?2, product_price_id = ?3, monthly_price = ?4, setup_fee = ?5,
            months = ?6, discount_percent = ?7, valid_until = ?8, notes = ?9, updated_at = ?10
         WHERE id = ?1",
        params![
            id,
            valid.lead_id,
            valid.product_price_id,
            valid.monthly_price.to_string(),
            valid.setup_fee.to_string(),
            valid.months,
            valid.discount_percent.to_string(),
            valid.valid_until,
            valid.notes,
            Utc::now(),
        ],
    )?;

    get_offer(conn, id)
}

pub fn delete_offer(conn: &Connection, id: &str) -> AppResult<()> {
    let offer = get_offer(conn, id)?;
    ensure_pending(&offer, "dihapus")?;
    conn.execute("DELETE FROM offers WHERE id = ?1", [id])?;
    Ok(())
}

/// Accept a pending offer and open a pending subscription for it.
///
/// An offer found past its validity date is marked expired (and stays so)
/// before the conflict is reported.
pub fn accept_offer(
    conn: &Connection,
    offer: &Offer,
    input: &AcceptOfferInput,
    actor: &User,
    today: NaiveDate,
) -> AppResult<(Offer, Subscription)> {
    ensure_pending(offer, "diterima")?;
    if offer.is_expired_on(today) {
        mark_expired(conn, &offer.id)?;
        return Err(AppError::conflict("Penawaran sudah kedaluwarsa."));
    }

    let mut v = Validator::new();
    let start_date = input.start_date.unwrap_or(today);
    v.date_not_before("start_date", "Tanggal mulai", start_date, today, "hari ini");
    let note = v.optional_str("note", "Catatan", input.note.as_deref(), 2000);
    v.finish()?;

    let tx = conn.unchecked_transaction()?;
    let subscription_id = subscription::insert_subscription(
        &tx,
        &NewSubscription {
            customer_id: &offer.lead_id,
            product_price_id: &offer.product_price_id,
            offer_id: Some(&offer.id),
            start_date,
            months: offer.months,
            monthly_price: offer.monthly_price,
            setup_fee: offer.setup_fee,
            discount_percent: offer.discount_percent,
            notes: offer.notes.clone(),
            created_by: &actor.id,
        },
    )?;

    let now = Utc::now();
    let changed = tx.execute(
        "UPDATE offers SET status = ?2, response_note = ?3, responded_at = ?4, subscription_id = ?5, updated_at = ?4
         WHERE id = ?1 AND status = ?6",
        params![
            offer.id,
            OfferStatus::Accepted.as_str(),
            note,
            now,
            subscription_id,
            OfferStatus::Pending.as_str(),
        ],
    )?;
    if changed == 0 {
        return Err(AppError::conflict("Penawaran sudah dijawab, silakan muat ulang."));
    }

    db::record_event(
        &tx,
        "offer.accepted",
        "offer",
        &offer.id,
        serde_json::json!({ "subscription_id": subscription_id }),
        &actor.id,
    )?;
    tx.commit()?;

    tracing::info!(offer_id = %offer.id, subscription_id = %subscription_id, "offer accepted");
    Ok((get_offer(conn, &offer.id)?, subscription::get_subscription(conn, &subscription_id)?))
}

pub fn reject_offer(
    conn: &Connection,
    offer: &Offer,
    input: &RejectOfferInput,
    actor: &User,
) -> AppResult<Offer> {
    ensure_pending(offer, "ditolak")?;

    let mut v = Validator::new();
    let note = v.optional_str("note", "Alasan", input.note.as_deref(), 2000);
    v.finish()?;

    let now = Utc::now();
    conn.execute(
        "UPDATE offers SET status = ?2, response_note = ?3, responded_at = ?4, updated_at = ?4
         WHERE id = ?1 AND status = ?5",
        params![
            offer.id,
            OfferStatus::Rejected.as_str(),
            note,
            now,
            OfferStatus::Pending.as_str(),
        ],
    )?;
    db::record_event(
        conn,
        "offer.rejected",
        "offer",
        &offer.id,
        serde_json::json!({ "note": note }),
        &actor.id,
    )?;

    tracing::info!(offer_id = %offer.id, "offer rejected");
    get_offer(conn, &offer.id)
}

fn mark_expired(conn: &Connection, id: &str) -> AppResult<()> {
    conn.execute(
        "UPDATE offers SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = ?4",
        params![id, OfferStatus::Expired.as_str(), Utc::now(), OfferStatus::Pending.as_str()],
    )?;
    Ok(())
}

/// Mark every pending offer whose `valid_until` lies before `today` as expired.
pub fn expire_offers(conn: &Connection, today: NaiveDate) -> AppResult<usize> {
    let count = conn.execute(
        "UPDATE offers SET status = ?1, updated_at = ?2 WHERE status = ?3 AND valid_until < ?4",
        params![
            OfferStatus::Expired.as_str(),
            Utc::now(),
            OfferStatus::Pending.as_str(),
            today,
        ],
    )?;
    if count > 0 {
        tracing::info!(count, "pending offers expired");
    }
    Ok(count)
}

pub fn count_by_status(conn: &Connection, status: OfferStatus) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM offers WHERE status = ?1",
        [status.as_str()],
        |row| row.get(0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_events_for_entity, test_connection};
    use crate::entities::product::create_test_price;
    use crate::entities::subscription::SubscriptionStatus;
    use crate::entities::user::create_test_user;
    use crate::permissions::Role;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn today() -> NaiveDate {
        date(2024, 5, 1)
    }

    struct Fixture {
        sales: User,
        lead: User,
        price_id: String,
    }

    fn setup(conn: &Connection) -> Fixture {
        Fixture {
            sales: create_test_user(conn, "Sales", Role::Sales),
            lead: create_test_user(conn, "Lead", Role::Lead),
            price_id: create_test_price(conn, dec!(250000), dec!(100000), 3).id,
        }
    }

    fn input(f: &Fixture) -> OfferInput {
        OfferInput {
            lead_id: Some(f.lead.id.clone()),
            product_price_id: Some(f.price_id.clone()),
            months: Some(12),
            discount_percent: Some(dec!(20)),
            valid_until: Some(date(2024, 5, 31)),
            notes: Some("Promo Mei".to_string()),
        }
    }

    #[test]
    fn test_create_offer_computes_contract_value() {
        let conn = test_connection();
        let f = setup(&conn);
        let offer = create_offer(&conn, &input(&f), &f.sales, today()).unwrap();

        assert_eq!(offer.status, OfferStatus::Pending);
        assert_eq!(offer.sales_name, "Sales");
        assert_eq!(offer.discounted_monthly_price, dec!(200000));
        // 250000 × 12 × 0.8 + 100000
        assert_eq!(offer.contract_value, dec!(2500000));
    }

    #[test]
    fn test_create_offer_validation() {
        let conn = test_connection();
        let f = setup(&conn);
        let mut bad = input(&f);
        bad.months = Some(1);
        bad.discount_percent = Some(dec!(150));
        bad.valid_until = Some(date(2024, 4, 30));
        bad.lead_id = Some(f.sales.id.clone());

        match create_offer(&conn, &bad, &f.sales, today()).unwrap_err() {
            AppError::Validation(errors) => {
                assert_eq!(
                    errors.fields(),
                    vec!["discount_percent", "lead_id", "months", "valid_until"]
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_accept_creates_pending_subscription() {
        let conn = test_connection();
        let f = setup(&conn);
        let offer = create_offer(&conn, &input(&f), &f.sales, today()).unwrap();

        let (accepted, subscription) = accept_offer(
            &conn,
            &offer,
            &AcceptOfferInput { start_date: Some(date(2024, 6, 1)), note: None },
            &f.lead,
            today(),
        )
        .unwrap();

        assert_eq!(accepted.status, OfferStatus::Accepted);
        assert_eq!(accepted.subscription_id.as_deref(), Some(subscription.id.as_str()));
        assert!(accepted.responded_at.is_some());

        assert_eq!(subscription.status, SubscriptionStatus::Pending);
        assert_eq!(subscription.offer_id.as_deref(), Some(offer.id.as_str()));
        assert_eq!(subscription.contract_value, offer.contract_value);
        assert_eq!(subscription.end_date, date(2025, 6, 1));

        let events = get_events_for_entity(&conn, "offer", &offer.id).unwrap();
        assert_eq!(events[0].event_type, "offer.accepted");

        // Second answer is a conflict
        let err = reject_offer(&conn, &accepted, &RejectOfferInput::default(), &f.lead).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_accept_expired_offer_marks_it_expired() {
        let conn = test_connection();
        let f = setup(&conn);
        let offer = create_offer(&conn, &input(&f), &f.sales, today()).unwrap();

        let later = date(2024, 6, 15);
        let err = accept_offer(&conn, &offer, &AcceptOfferInput::default(), &f.lead, later).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        assert_eq!(get_offer(&conn, &offer.id).unwrap().status, OfferStatus::Expired);
    }

    #[test]
    fn test_price_snapshot_survives_catalog_change() {
        let conn = test_connection();
        let f = setup(&conn);
        let offer = create_offer(&conn, &input(&f), &f.sales, today()).unwrap();

        conn.execute(
            "UPDATE product_prices SET monthly_price = '999999' WHERE id = ?1",
            [&f.price_id],
        )
        .unwrap();

        assert_eq!(get_offer(&conn, &offer.id).unwrap().monthly_price, dec!(250000));
    }

    #[test]
    fn test_update_and_delete_only_pending() {
        let conn = test_connection();
        let f = setup(&conn);
        let offer = create_offer(&conn, &input(&f), &f.sales, today()).unwrap();

        let mut changed = input(&f);
        changed.discount_percent = None;
        let updated = update_offer(&conn, &offer.id, &changed, today()).unwrap();
        assert_eq!(updated.discount_percent, Decimal::ZERO);

        let rejected = reject_offer(
            &conn,
            &updated,
            &RejectOfferInput { note: Some("Terlalu mahal".to_string()) },
            &f.lead,
        )
        .unwrap();
        assert_eq!(rejected.response_note.as_deref(), Some("Terlalu mahal"));

        assert!(matches!(update_offer(&conn, &offer.id, &changed, today()), Err(AppError::Conflict(_))));
        assert!(matches!(delete_offer(&conn, &offer.id), Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_expire_sweep_and_visibility() {
        let conn = test_connection();
        let f = setup(&conn);
        let other_lead = create_test_user(&conn, "Other", Role::Lead);
        create_offer(&conn, &input(&f), &f.sales, today()).unwrap();
        let mut theirs = input(&f);
        theirs.lead_id = Some(other_lead.id.clone());
        theirs.valid_until = Some(date(2024, 12, 31));
        let theirs = create_offer(&conn, &theirs, &f.sales, today()).unwrap();

        let mine = list_offers(&conn, &OfferFilter::default(), &f.lead, PageRequest::default()).unwrap();
        assert_eq!(mine.meta.total, 1);
        assert!(matches!(get_offer_for(&conn, &theirs.id, &f.lead), Err(AppError::NotFound(_))));

        assert_eq!(expire_offers(&conn, date(2024, 7, 1)).unwrap(), 1);
        assert_eq!(count_by_status(&conn, OfferStatus::Expired).unwrap(), 1);
        assert_eq!(count_by_status(&conn, OfferStatus::Pending).unwrap(), 1);

        let expired = list_offers(
            &conn,
            &OfferFilter { status: Some("expired".to_string()), lead_id: None },
            &f.sales,
            PageRequest::default(),
        )
        .unwrap();
        assert_eq!(expired.items.len(), 1);
    }
}
