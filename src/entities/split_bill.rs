// Split Bill Entity - share a receipt between participants
//
// Participants and items are submitted together with the bill and replace
// the stored ones on every update. Items reference participants by their
// index in the submitted `participants` list.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::db::{decimal_at, new_id};
use crate::entities::user::User;
use crate::error::{AppError, AppResult};
use crate::pagination::{PageRequest, Paginated};
use crate::pricing::round_money;
use crate::validation::Validator;

// ============================================================================
// RESOURCES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillItem {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total: Decimal,
    /// Empty means the item is shared by everyone
    pub participant_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Share {
    pub participant_id: String,
    pub name: String,
    pub subtotal: Decimal,
    pub service: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub is_paid: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Breakdown {
    pub subtotal: Decimal,
    pub service: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub shares: Vec<Share>,
    pub paid_total: Decimal,
    pub outstanding: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SplitBill {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub bill_date: NaiveDate,
    pub service_percent: Decimal,
    pub tax_percent: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub participants: Vec<Participant>,
    pub items: Vec<BillItem>,
    pub breakdown: Breakdown,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SplitBillInput {
    pub title: Option<String>,
    pub bill_date: Option<NaiveDate>,
    pub service_percent: Option<Decimal>,
    pub tax_percent: Option<Decimal>,
    pub notes: Option<String>,
    pub participants: Option<Vec<String>>,
    pub items: Option<Vec<BillItemInput>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BillItemInput {
    pub name: Option<String>,
    pub quantity: Option<i64>,
    pub unit_price: Option<Decimal>,
    /// Indices into `SplitBillInput::participants`
    #[serde(default)]
    pub participants: Vec<usize>,
}

// ============================================================================
// BREAKDOWN
// ============================================================================

fn bill_too_large() -> AppError {
    AppError::invalid("items", "Total tagihan melebihi batas maksimal.")
}

/// `unit_price × quantity`, refused when it does not fit a `Decimal`.
pub fn item_total(unit_price: Decimal, quantity: u32) -> AppResult<Decimal> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(bill_too_large)
}

/// Split the bill. Each item is divided equally between its participants
/// (everyone when none are assigned). Service is charged on the subtotal
/// and tax on subtotal + service. Shares are rounded to cents and the
/// rounding remainder goes to the first participant, so shares always add
/// up to the rounded bill total.
///
/// Totals that overflow are a validation error on `items`. Once the bill
/// total fits, every share fits too since each share is a part of it.
pub fn compute_breakdown(
    participants: &[Participant],
    items: &[BillItem],
    service_percent: Decimal,
    tax_percent: Decimal,
) -> AppResult<Breakdown> {
    let service_rate = service_percent / Decimal::ONE_HUNDRED;
    let tax_rate = tax_percent / Decimal::ONE_HUNDRED;

    let subtotal = items
        .iter()
        .try_fold(Decimal::ZERO, |acc, i| acc.checked_add(i.total))
        .ok_or_else(bill_too_large)?;
    let service = subtotal
        .checked_mul(service_rate)
        .map(round_money)
        .ok_or_else(bill_too_large)?;
    let taxable = subtotal.checked_add(service).ok_or_else(bill_too_large)?;
    let tax = taxable.checked_mul(tax_rate).map(round_money).ok_or_else(bill_too_large)?;
    let total = taxable.checked_add(tax).map(round_money).ok_or_else(bill_too_large)?;

    let mut raw: Vec<Decimal> = vec![Decimal::ZERO; participants.len()];
    let index: HashMap<&str, usize> = participants
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id.as_str(), i))
        .collect();

    for item in items {
        let holders: Vec<usize> = if item.participant_ids.is_empty() {
            (0..participants.len()).collect()
        } else {
            item.participant_ids
                .iter()
                .filter_map(|id| index.get(id.as_str()).copied())
                .collect()
        };
        if holders.is_empty() {
            continue;
        }
        let portion = item.total / Decimal::from(holders.len());
        for i in holders {
            raw[i] += portion;
        }
    }

    let mut shares: Vec<Share> = participants
        .iter()
        .zip(raw)
        .map(|(p, sub)| {
            let svc = sub * service_rate;
            let tx = (sub + svc) * tax_rate;
            Share {
                participant_id: p.id.clone(),
                name: p.name.clone(),
                subtotal: round_money(sub),
                service: round_money(svc),
                tax: round_money(tx),
                total: round_money(sub + svc + tx),
                is_paid: p.is_paid,
            }
        })
        .collect();

    let allocated: Decimal = shares.iter().map(|s| s.total).sum();
    if let Some(first) = shares.first_mut() {
        first.total += total - allocated;
    }

    let paid_total: Decimal = shares.iter().filter(|s| s.is_paid).map(|s| s.total).sum();
    Ok(Breakdown {
        subtotal: round_money(subtotal),
        service,
        tax,
        total,
        shares,
        paid_total,
        outstanding: total - paid_total,
    })
}

// ============================================================================
// LOADING
// ============================================================================

const BILL_COLUMNS: &str =
    "id, user_id, title, bill_date, service_percent, tax_percent, notes, created_at, updated_at";

fn bill_from_row(row: &Row) -> rusqlite::Result<SplitBill> {
    Ok(SplitBill {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        bill_date: row.get(3)?,
        service_percent: decimal_at(row, 4)?,
        tax_percent: decimal_at(row, 5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        participants: Vec::new(),
        items: Vec::new(),
        breakdown: Breakdown::default(),
    })
}

fn load_children(conn: &Connection, bill: &mut SplitBill) -> AppResult<()> {
    let mut stmt = conn.prepare(
        "SELECT id, name, is_paid, paid_at FROM split_bill_participants
         WHERE split_bill_id = ?1 ORDER BY position ASC",
    )?;
    bill.participants = stmt
        .query_map([&bill.id], |row| {
            Ok(Participant {
                id: row.get(0)?,
                name: row.get(1)?,
                is_paid: row.get(2)?,
                paid_at: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT id, name, quantity, unit_price FROM split_bill_items
         WHERE split_bill_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt
        .query_map([&bill.id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                decimal_at(row, 3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    let mut items = Vec::with_capacity(rows.len());
    for (id, name, quantity, unit_price) in rows {
        items.push(BillItem {
            id,
            name,
            quantity,
            unit_price,
            total: item_total(unit_price, quantity)?,
            participant_ids: Vec::new(),
        });
    }

    let mut stmt = conn.prepare(
        "SELECT ip.item_id, ip.participant_id
         FROM split_bill_item_participants ip
         JOIN split_bill_items i ON i.id = ip.item_id
         JOIN split_bill_participants p ON p.id = ip.participant_id
         WHERE i.split_bill_id = ?1
         ORDER BY p.position ASC",
    )?;
    let links = stmt
        .query_map([&bill.id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    for (item_id, participant_id) in links {
        if let Some(item) = items.iter_mut().find(|i| i.id == item_id) {
            item.participant_ids.push(participant_id);
        }
    }

    bill.items = items;
    bill.breakdown = compute_breakdown(&bill.participants, &bill.items, bill.service_percent, bill.tax_percent)?;
    Ok(())
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn get_bill_for(conn: &Connection, id: &str, user: &User) -> AppResult<SplitBill> {
    let sql = format!("SELECT {} FROM split_bills WHERE id = ?1 AND user_id = ?2", BILL_COLUMNS);
    let mut bill = conn
        .query_row(&sql, params![id, user.id], bill_from_row)
        .optional()?
        .ok_or(AppError::NotFound("Split bill"))?;
    load_children(conn, &mut bill)?;
    Ok(bill)
}

pub fn list_bills(conn: &Connection, user: &User, page: PageRequest) -> AppResult<Paginated<SplitBill>> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM split_bills WHERE user_id = ?1",
        [&user.id],
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM split_bills WHERE user_id = ?1
         ORDER BY bill_date DESC, created_at DESC LIMIT ?2 OFFSET ?3",
        BILL_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut bills = stmt
        .query_map(params![user.id, page.limit(), page.offset()], bill_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    for bill in &mut bills {
        load_children(conn, bill)?;
    }

    Ok(Paginated::new(bills, page, total))
}

// ============================================================================
// MUTATIONS
// ============================================================================

/// Upper bound for an item's quantity
pub const MAX_QUANTITY: i64 = 10_000;

struct ValidItem {
    name: String,
    quantity: u32,
    unit_price: Decimal,
    participants: Vec<usize>,
}

struct ValidBill {
    title: String,
    bill_date: NaiveDate,
    service_percent: Decimal,
    tax_percent: Decimal,
    notes: Option<String>,
    participants: Vec<String>,
    items: Vec<ValidItem>,
}

fn validate(input: &SplitBillInput) -> AppResult<ValidBill> {
    let mut v = Validator::new();
    let title = v.required_str("title", "Judul", input.title.as_deref(), 255);
    let bill_date = v.required("bill_date", "Tanggal", input.bill_date);
    let service_percent = round_money(input.service_percent.unwrap_or_default());
    v.percentage("service_percent", "Service", service_percent);
    let tax_percent = round_money(input.tax_percent.unwrap_or_default());
    v.percentage("tax_percent", "Pajak", tax_percent);
    let notes = v.optional_str("notes", "Catatan", input.notes.as_deref(), 1000);

    let raw_participants = input.participants.as_deref().unwrap_or_default();
    if raw_participants.is_empty() {
        v.add("participants", "Minimal satu peserta wajib diisi.");
    }
    let mut participants = Vec::with_capacity(raw_participants.len());
    let mut seen = HashSet::new();
    for (i, name) in raw_participants.iter().enumerate() {
        let field = format!("participants.{}", i);
        if let Some(name) = v.required_str(&field, "Nama peserta", Some(name.as_str()), 100) {
            if !seen.insert(name.to_lowercase()) {
                v.add(&field, "Nama peserta tidak boleh sama.");
            }
            participants.push(name);
        } else {
            participants.push(String::new());
        }
    }

    let raw_items = input.items.as_deref().unwrap_or_default();
    if raw_items.is_empty() {
        v.add("items", "Minimal satu item wajib diisi.");
    }
    let mut pending = Vec::with_capacity(raw_items.len());
    for (i, item) in raw_items.iter().enumerate() {
        let name = v.required_str(&format!("items.{}.name", i), "Nama item", item.name.as_deref(), 255);
        let quantity_field = format!("items.{}.quantity", i);
        let quantity = v.required(&quantity_field, "Jumlah", item.quantity);
        if let Some(q) = quantity {
            v.min_int(&quantity_field, "Jumlah", q, 1);
            v.max_int(&quantity_field, "Jumlah", q, MAX_QUANTITY);
        }
        let price_field = format!("items.{}.unit_price", i);
        let unit_price = v.required(&price_field, "Harga satuan", item.unit_price).map(round_money);
        if let Some(price) = unit_price {
            v.non_negative(&price_field, "Harga satuan", price);
            v.max_amount(&price_field, "Harga satuan", price);
        }
        let links_field = format!("items.{}.participants", i);
        if item.participants.iter().any(|&idx| idx >= raw_participants.len()) {
            v.add(&links_field, "Peserta yang dipilih tidak valid.");
        }
        let mut links = item.participants.clone();
        links.sort_unstable();
        links.dedup();

        pending.push((name, quantity.and_then(|q| u32::try_from(q).ok()), unit_price, links));
    }
    v.finish()?;

    let mut items = Vec::with_capacity(pending.len());
    for (name, quantity, unit_price, participants) in pending {
        let (Some(name), Some(quantity), Some(unit_price)) = (name, quantity, unit_price) else {
            return Err(AppError::invalid("items", "Data item tidak lengkap."));
        };
        items.push(ValidItem { name, quantity, unit_price, participants });
    }

    let (Some(title), Some(bill_date)) = (title, bill_date) else {
        return Err(AppError::invalid("title", "Data split bill tidak lengkap."));
    };
    Ok(ValidBill { title, bill_date, service_percent, tax_percent, notes, participants, items })
}

/// Replace participants and items. Participants keep their paid state
/// when a participant with the same name existed before.
fn write_children(conn: &Connection, bill_id: &str, valid: &ValidBill, previous: &[Participant]) -> AppResult<()> {
    conn.execute("DELETE FROM split_bill_items WHERE split_bill_id = ?1", [bill_id])?;
    conn.execute("DELETE FROM split_bill_participants WHERE split_bill_id = ?1", [bill_id])?;

    let mut participant_ids = Vec::with_capacity(valid.participants.len());
    for (position, name) in valid.participants.iter().enumerate() {
        let kept = previous.iter().find(|p| p.name.eq_ignore_ascii_case(name));
        let id = new_id();
        conn.execute(
            "INSERT INTO split_bill_participants (id, split_bill_id, position, name, is_paid, paid_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                bill_id,
                position as i64,
                name,
                kept.map(|p| p.is_paid).unwrap_or(false),
                kept.and_then(|p| p.paid_at),
            ],
        )?;
        participant_ids.push(id);
    }

    for (position, item) in valid.items.iter().enumerate() {
        let item_id = new_id();
        conn.execute(
            "INSERT INTO split_bill_items (id, split_bill_id, position, name, quantity, unit_price)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![item_id, bill_id, position as i64, item.name, item.quantity, item.unit_price.to_string()],
        )?;
        for &idx in &item.participants {
            conn.execute(
                "INSERT INTO split_bill_item_participants (item_id, participant_id) VALUES (?1, ?2)",
                params![item_id, participant_ids[idx]],
            )?;
        }
    }
    Ok(())
}

pub fn create_bill(conn: &Connection, input: &SplitBillInput, user: &User) -> AppResult<SplitBill> {
    let valid = validate(input)?;
    let id = new_id();
    let now = Utc::now();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO split_bills (id, user_id, title, bill_date, service_percent, tax_percent, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            id,
            user.id,
            valid.title,
            valid.bill_date,
            valid.service_percent.to_string(),
            valid.tax_percent.to_string(),
            valid.notes,
            now
        ],
    )?;
    write_children(&tx, &id, &valid, &[])?;
    let bill = get_bill_for(&tx, &id, user)?;
    tx.commit()?;

    tracing::info!(split_bill_id = %id, user_id = %user.id, "split bill created");
    Ok(bill)
}

pub fn update_bill(conn: &Connection, id: &str, input: &SplitBillInput, user: &User) -> AppResult<SplitBill> {
    let existing = get_bill_for(conn, id, user)?;
    let valid = validate(input)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE split_bills SET title = ?2, bill_date = ?3, service_percent = ?4, tax_percent = ?5,
            notes = ?6, updated_at = ?7
         WHERE id = ?1",
        params![
            id,
            valid.title,
            valid.bill_date,
            valid.service_percent.to_string(),
            valid.tax_percent.to_string(),
            valid.notes,
            Utc::now()
        ],
    )?;
    write_children(&tx, id, &valid, &existing.participants)?;
    let bill = get_bill_for(&tx, id, user)?;
    tx.commit()?;

    Ok(bill)
}

pub fn delete_bill(conn: &Connection, id: &str, user: &User) -> AppResult<()> {
    get_bill_for(conn, id, user)?;
    conn.execute("DELETE FROM split_bills WHERE id = ?1", [id])?;
    Ok(())
}

/// Flip a participant between paid and unpaid.
pub fn toggle_paid(conn: &Connection, bill_id: &str, participant_id: &str, user: &User) -> AppResult<SplitBill> {
    let bill = get_bill_for(conn, bill_id, user)?;
    let participant = bill
        .participants
        .iter()
        .find(|p| p.id == participant_id)
        .ok_or(AppError::NotFound("Peserta"))?;

    let (is_paid, paid_at) = if participant.is_paid {
        (false, None)
    } else {
        (true, Some(Utc::now()))
    };
    conn.execute(
        "UPDATE split_bill_participants SET is_paid = ?2, paid_at = ?3 WHERE id = ?1",
        params![participant_id, is_paid, paid_at],
    )?;

    get_bill_for(conn, bill_id, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;
    use crate::entities::user::create_test_user;
    use crate::permissions::Role;
    use rust_decimal_macros::dec;

    fn dinner() -> SplitBillInput {
        SplitBillInput {
            title: Some("Makan malam".to_string()),
            bill_date: NaiveDate::from_ymd_opt(2024, 4, 12),
            service_percent: Some(dec!(5)),
            tax_percent: Some(dec!(10)),
            notes: None,
            participants: Some(vec!["Andi".into(), "Budi".into(), "Citra".into()]),
            items: Some(vec![
                BillItemInput { name: Some("Nasi goreng".into()), quantity: Some(2), unit_price: Some(dec!(25000)), participants: vec![0, 1] },
                BillItemInput { name: Some("Es teh".into()), quantity: Some(3), unit_price: Some(dec!(5000)), participants: vec![] },
                BillItemInput { name: Some("Sate".into()), quantity: Some(1), unit_price: Some(dec!(40000)), participants: vec![2] },
            ]),
        }
    }

    #[test]
    fn test_breakdown_matches_bill_total() {
        let conn = test_connection();
        let user = create_test_user(&conn, "Rina", Role::Customer);
        let bill = create_bill(&conn, &dinner(), &user).unwrap();

        // subtotal 105000, service 5250, tax 11025
        let b = &bill.breakdown;
        assert_eq!(b.subtotal, dec!(105000));
        assert_eq!(b.service, dec!(5250));
        assert_eq!(b.tax, dec!(11025));
        assert_eq!(b.total, dec!(121275));

        // Andi: 25000 + 5000 = 30000 → ×1.05 ×1.10 = 34650
        assert_eq!(b.shares[0].total, dec!(34650));
        assert_eq!(b.shares[2].total, dec!(51975));
        let sum: Decimal = b.shares.iter().map(|s| s.total).sum();
        assert_eq!(sum, b.total);
    }

    #[test]
    fn test_rounding_remainder_goes_to_first_participant() {
        let participants: Vec<Participant> = ["A", "B", "C"]
            .iter()
            .map(|n| Participant { id: n.to_string(), name: n.to_string(), is_paid: false, paid_at: None })
            .collect();
        let items = vec![BillItem {
            id: "i".into(),
            name: "Pizza".into(),
            quantity: 1,
            unit_price: dec!(100),
            total: dec!(100),
            participant_ids: vec![],
        }];

        let b = compute_breakdown(&participants, &items, Decimal::ZERO, Decimal::ZERO).unwrap();
        assert_eq!(b.shares[0].total, dec!(33.34));
        assert_eq!(b.shares[1].total, dec!(33.33));
        assert_eq!(b.shares[2].total, dec!(33.33));
    }

    #[test]
    fn test_validation_uses_dotted_keys() {
        let conn = test_connection();
        let user = create_test_user(&conn, "Rina", Role::Customer);
        let mut input = dinner();
        input.participants = Some(vec!["Andi".into(), "andi".into()]);
        input.items = Some(vec![BillItemInput {
            name: None,
            quantity: Some(0),
            unit_price: Some(dec!(1000)),
            participants: vec![5],
        }]);
        input.tax_percent = Some(dec!(150));

        let err = create_bill(&conn, &input, &user).unwrap_err();
        match err {
            AppError::Validation(e) => {
                assert_eq!(
                    e.fields(),
                    vec!["items.0.name", "items.0.participants", "items.0.quantity", "participants.1", "tax_percent"]
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_toggle_paid_and_update_keeps_paid_state() {
        let conn = test_connection();
        let user = create_test_user(&conn, "Rina", Role::Customer);
        let bill = create_bill(&conn, &dinner(), &user).unwrap();
        let andi = bill.participants[0].id.clone();

        let bill = toggle_paid(&conn, &bill.id, &andi, &user).unwrap();
        assert!(bill.participants[0].is_paid);
        assert_eq!(bill.breakdown.paid_total, dec!(34650));
        assert_eq!(bill.breakdown.outstanding, dec!(86625));

        let mut input = dinner();
        input.title = Some("Makan malam Jumat".into());
        let bill = update_bill(&conn, &bill.id, &input, &user).unwrap();
        assert_eq!(bill.title, "Makan malam Jumat");
        assert!(bill.participants[0].is_paid);
        assert!(!bill.participants[1].is_paid);

        let bill = toggle_paid(&conn, &bill.id, &bill.participants[0].id.clone(), &user).unwrap();
        assert!(!bill.participants[0].is_paid);
    }

    #[test]
    fn test_bills_are_private() {
        let conn = test_connection();
        let owner = create_test_user(&conn, "Rina", Role::Customer);
        let other = create_test_user(&conn, "Dewi", Role::Customer);
        let bill = create_bill(&conn, &dinner(), &owner).unwrap();

        assert!(matches!(get_bill_for(&conn, &bill.id, &other), Err(AppError::NotFound(_))));
        assert!(matches!(delete_bill(&conn, &bill.id, &other), Err(AppError::NotFound(_))));
        delete_bill(&conn, &bill.id, &owner).unwrap();
        assert_eq!(list_bills(&conn, &owner, PageRequest::default()).unwrap().meta.total, 0);
    }

    #[test]
    fn test_oversized_items_are_rejected_before_saving() {
        let conn = test_connection();
        let user = create_test_user(&conn, "Rina", Role::Customer);
        let mut input = dinner();
        input.items = Some(vec![
            BillItemInput { name: Some("Lukisan".into()), quantity: Some(2), unit_price: Some(Decimal::MAX), participants: vec![] },
            BillItemInput { name: Some("Kopi".into()), quantity: Some(5_000_000_000), unit_price: Some(dec!(1000)), participants: vec![] },
        ]);

        match create_bill(&conn, &input, &user).unwrap_err() {
            AppError::Validation(e) => {
                assert_eq!(e.fields(), vec!["items.0.unit_price", "items.1.quantity"]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(list_bills(&conn, &user, PageRequest::default()).unwrap().meta.total, 0);
    }

    #[test]
    fn test_breakdown_overflow_is_an_error() {
        let participants = vec![Participant { id: "A".into(), name: "A".into(), is_paid: false, paid_at: None }];
        let item = |id: &str| BillItem {
            id: id.into(),
            name: "Mahal".into(),
            quantity: 1,
            unit_price: Decimal::MAX,
            total: Decimal::MAX,
            participant_ids: vec![],
        };

        assert!(item_total(Decimal::MAX, 2).is_err());
        let result = compute_breakdown(&participants, &[item("1"), item("2")], Decimal::ZERO, Decimal::ZERO);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
