// Product Entity - catalog items and their price plans
//
// A product belongs to a `product` category and owns any number of price
// plans. Offers and subscriptions point at a price plan, never at the
// product directly.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::db::{decimal_at, like_pattern, new_id};
use crate::entities::category::{check_category_kind, CategoryKind};
use crate::error::{AppError, AppResult};
use crate::pricing;
use crate::validation::Validator;

// ============================================================================
// ENTITIES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: String,
    pub category_id: String,
    pub category_name: String,
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub prices: Vec<ProductPrice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductPrice {
    pub id: String,
    pub product_id: String,
    pub name: String,
    pub monthly_price: Decimal,
    pub setup_fee: Decimal,
    pub min_months: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// Value of the shortest allowed contract, for display
    pub contract_value: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductInput {
    pub category_id: Option<String>,
    pub name: Option<String>,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PriceInput {
    pub name: Option<String>,
    pub monthly_price: Option<Decimal>,
    pub setup_fee: Option<Decimal>,
    pub min_months: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category_id: Option<String>,
    pub active: Option<bool>,
}

const PRODUCT_SELECT: &str = "SELECT p.id, p.category_id, c.name, p.name, p.sku, p.description,
        p.is_active, p.created_at, p.updated_at
     FROM products p
     JOIN categories c ON c.id = p.category_id";

const PRICE_COLUMNS: &str =
    "id, product_id, name, monthly_price, setup_fee, min_months, is_active, created_at";

fn product_from_row(row: &Row) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        category_id: row.get(1)?,
        category_name: row.get(2)?,
        name: row.get(3)?,
        sku: row.get(4)?,
        description: row.get(5)?,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        prices: Vec::new(),
    })
}

fn price_from_row(row: &Row) -> rusqlite::Result<ProductPrice> {
    let monthly_price = decimal_at(row, 3)?;
    let setup_fee = decimal_at(row, 4)?;
    let min_months: u32 = row.get(5)?;
    Ok(ProductPrice {
        id: row.get(0)?,
        product_id: row.get(1)?,
        name: row.get(2)?,
        monthly_price,
        setup_fee,
        min_months,
        is_active: row.get(6)?,
        created_at: row.get(7)?,
        contract_value: pricing::contract_value(monthly_price, min_months, setup_fee, Decimal::ZERO),
    })
}

// ============================================================================
// PRODUCTS
// ============================================================================

struct ValidProduct {
    category_id: String,
    name: String,
    sku: String,
    description: Option<String>,
    is_active: bool,
}

fn validate_product(
    conn: &Connection,
    input: &ProductInput,
    existing_id: Option<&str>,
) -> AppResult<ValidProduct> {
    let mut v = Validator::new();

    let category_id = v.required_str("category_id", "Kategori", input.category_id.as_deref(), 64);
    if let Some(category_id) = &category_id {
        check_category_kind(conn, &mut v, "category_id", category_id, CategoryKind::Product)?;
    }
    let name = v.required_str("name", "Nama produk", input.name.as_deref(), 255);
    let sku = v
        .required_str("sku", "SKU", input.sku.as_deref(), 64)
        .map(|s| s.to_uppercase());
    if let Some(sku) = &sku {
        let other: Option<String> = conn
            .query_row("SELECT id FROM products WHERE sku = ?1", [sku], |row| row.get(0))
            .optional()?;
        if other.is_some() && other.as_deref() != existing_id {
            v.taken("sku", "SKU");
        }
    }
    let description = v.optional_str("description", "Deskripsi", input.description.as_deref(), 2000);

    v.finish()?;
    Ok(ValidProduct {
        category_id: category_id.unwrap_or_default(),
        name: name.unwrap_or_default(),
        sku: sku.unwrap_or_default(),
        description,
        is_active: input.is_active.unwrap_or(true),
    })
}

pub fn list_products(conn: &Connection, filter: &ProductFilter) -> AppResult<Vec<Product>> {
    let pattern = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(like_pattern);

    let sql = format!(
        "{} WHERE (?1 IS NULL OR p.name LIKE ?1 ESCAPE '\\' OR p.sku LIKE ?1 ESCAPE '\\')
           AND (?2 IS NULL OR p.category_id = ?2)
           AND (?3 IS NULL OR p.is_active = ?3)
         ORDER BY p.name ASC",
        PRODUCT_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut products = stmt
        .query_map(
            params![pattern, filter.category_id, filter.active],
            product_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    for product in &mut products {
        product.prices = list_prices(conn, &product.id)?;
    }

    Ok(products)
}

pub fn get_product(conn: &Connection, id: &str) -> AppResult<Product> {
    let sql = format!("{} WHERE p.id = ?1", PRODUCT_SELECT);
    let mut product = conn
        .query_row(&sql, [id], product_from_row)
        .optional()?
        .ok_or(AppError::NotFound("Produk"))?;
    product.prices = list_prices(conn, id)?;
    Ok(product)
}

pub fn create_product(conn: &Connection, input: &ProductInput) -> AppResult<Product> {
    let valid = validate_product(conn, input, None)?;
    let id = new_id();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO products (id, category_id, name, sku, description, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![id, valid.category_id, valid.name, valid.sku, valid.description, valid.is_active, now],
    )?;

    tracing::info!(product_id = %id, sku = %valid.sku, "product created");
    get_product(conn, &id)
}

pub fn update_product(conn: &Connection, id: &str, input: &ProductInput) -> AppResult<Product> {
    get_product(conn, id)?;
    let valid = validate_product(conn, input, Some(id))?;

    conn.execute(
        "UPDATE products SET category_id = ?2, name = ?3, sku = ?4, description = ?5, is_active = ?6, updated_at = ?7
         WHERE id = ?1",
        params![id, valid.category_id, valid.name, valid.sku, valid.description, valid.is_active, Utc::now()],
    )?;

    get_product(conn, id)
}

/// Prices cascade with the product; a price still used by an offer or a
/// subscription blocks the delete.
pub fn delete_product(conn: &Connection, id: &str) -> AppResult<()> {
    get_product(conn, id)?;
    conn.execute("DELETE FROM products WHERE id = ?1", [id])
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::conflict(
                "Produk tidak dapat dihapus karena sudah digunakan pada penawaran atau langganan.",
            ),
            other => other,
        })?;
    Ok(())
}

// ============================================================================
// PRICES
// ============================================================================

struct ValidPrice {
    name: String,
    monthly_price: Decimal,
    setup_fee: Decimal,
    min_months: u32,
    is_active: bool,
}

fn validate_price(input: &PriceInput) -> AppResult<ValidPrice> {
    let mut v = Validator::new();

    let name = v.required_str("name", "Nama paket", input.name.as_deref(), 255);
    let monthly_price = v.required("monthly_price", "Harga bulanan", input.monthly_price);
    if let Some(price) = monthly_price {
        v.non_negative("monthly_price", "Harga bulanan", price);
        v.max_amount("monthly_price", "Harga bulanan", price);
    }
    let setup_fee = input.setup_fee.unwrap_or(Decimal::ZERO);
    v.non_negative("setup_fee", "Biaya pemasangan", setup_fee);
    v.max_amount("setup_fee", "Biaya pemasangan", setup_fee);
    let min_months = input.min_months.unwrap_or(1);
    v.min_int("min_months", "Durasi minimum", min_months, 1);
    if min_months > 120 {
        v.add("min_months", "Durasi minimum maksimal 120 bulan.");
    }

    v.finish()?;
    Ok(ValidPrice {
        name: name.unwrap_or_default(),
        monthly_price: pricing::round_money(monthly_price.unwrap_or_default()),
        setup_fee: pricing::round_money(setup_fee),
        min_months: min_months as u32,
        is_active: input.is_active.unwrap_or(true),
    })
}

pub fn list_prices(conn: &Connection, product_id: &str) -> AppResult<Vec<ProductPrice>> {
    let sql = format!(
        "SELECT {} FROM product_prices WHERE product_id = ?1 ORDER BY created_at ASC, name ASC",
        PRICE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let prices = stmt
        .query_map([product_id], price_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(prices)
}

pub fn get_price(conn: &Connection, id: &str) -> AppResult<ProductPrice> {
    let sql = format!("SELECT {} FROM product_prices WHERE id = ?1", PRICE_COLUMNS);
    conn.query_row(&sql, [id], price_from_row)
        .optional()?
        .ok_or(AppError::NotFound("Paket harga"))
}

/// Price lookup scoped to its product (nested routes)
pub fn get_product_price(conn: &Connection, product_id: &str, price_id: &str) -> AppResult<ProductPrice> {
    match get_price(conn, price_id)? {
        price if price.product_id == product_id => Ok(price),
        _ => Err(AppError::NotFound("Paket harga")),
    }
}

pub fn create_price(conn: &Connection, product_id: &str, input: &PriceInput) -> AppResult<ProductPrice> {
    get_product(conn, product_id)?;
    let valid = validate_price(input)?;
    let id = new_id();

    conn.execute(
        "INSERT INTO product_prices (id, product_id, name, monthly_price, setup_fee, min_months, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            product_id,
            valid.name,
            valid.monthly_price.to_string(),
            valid.setup_fee.to_string(),
            valid.min_months,
            valid.is_active,
            Utc::now(),
        ],
    )?;

    get_price(conn, &id)
}

/// Existing offers and subscriptions keep their own price snapshot, so
/// editing a plan never rewrites signed contracts.
pub fn update_price(
    conn: &Connection,
    product_id: &str,
    price_id: &str,
    input: &PriceInput,
) -> AppResult<ProductPrice> {
    get_product_price(conn, product_id, price_id)?;
    let valid = validate_price(input)?;

    conn.execute(
        "UPDATE product_prices SET name = ?2, monthly_price = ?3, setup_fee = ?4, min_months = ?5, is_active = ?6
         WHERE id = ?1",
        params![
            price_id,
            valid.name,
            valid.monthly_price.to_string(),
            valid.setup_fee.to_string(),
            valid.min_months,
            valid.is_active,
        ],
    )?;

    get_price(conn, price_id)
}

pub fn delete_price(conn: &Connection, product_id: &str, price_id: &str) -> AppResult<()> {
    get_product_price(conn, product_id, price_id)?;
    conn.execute("DELETE FROM product_prices WHERE id = ?1", [price_id])
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::conflict(
                "Paket harga tidak dapat dihapus karena sudah digunakan.",
            ),
            other => other,
        })?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn create_test_price(
    conn: &Connection,
    monthly_price: Decimal,
    setup_fee: Decimal,
    min_months: i64,
) -> ProductPrice {
    use crate::entities::category::create_test_category;

    let category = create_test_category(conn, &format!("Kategori {}", new_id()), CategoryKind::Product);
    let product = create_product(
        conn,
        &ProductInput {
            category_id: Some(category.id),
            name: Some("Internet Rumah".to_string()),
            sku: Some(format!("NET-{}", &new_id()[..8])),
            description: None,
            is_active: Some(true),
        },
    )
    .unwrap();

    create_price(
        conn,
        &product.id,
        &PriceInput {
            name: Some("Paket 50 Mbps".to_string()),
            monthly_price: Some(monthly_price),
            setup_fee: Some(setup_fee),
            min_months: Some(min_months),
            is_active: Some(true),
        },
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;
    use crate::entities::category::create_test_category;
    use rust_decimal_macros::dec;

    fn product_input(category_id: &str, sku: &str) -> ProductInput {
        ProductInput {
            category_id: Some(category_id.to_string()),
            name: Some("Internet Kantor".to_string()),
            sku: Some(sku.to_string()),
            description: Some("Fiber dedicated".to_string()),
            is_active: None,
        }
    }

    #[test]
    fn test_create_product_with_prices() {
        let conn = test_connection();
        let category = create_test_category(&conn, "Internet", CategoryKind::Product);
        let product = create_product(&conn, &product_input(&category.id, "net-100")).unwrap();

        assert_eq!(product.sku, "NET-100");
        assert_eq!(product.category_name, "Internet");
        assert!(product.is_active);

        create_price(
            &conn,
            &product.id,
            &PriceInput {
                name: Some("100 Mbps".to_string()),
                monthly_price: Some(dec!(500000)),
                setup_fee: Some(dec!(750000)),
                min_months: Some(12),
                is_active: None,
            },
        )
        .unwrap();

        let product = get_product(&conn, &product.id).unwrap();
        assert_eq!(product.prices.len(), 1);
        // 500000 × 12 + 750000
        assert_eq!(product.prices[0].contract_value, dec!(6750000));
    }

    #[test]
    fn test_product_requires_product_category() {
        let conn = test_connection();
        let expense = create_test_category(&conn, "Makan", CategoryKind::Expense);

        let err = create_product(&conn, &product_input(&expense.id, "X-1")).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.has("category_id")));
    }

    #[test]
    fn test_sku_unique() {
        let conn = test_connection();
        let category = create_test_category(&conn, "Internet", CategoryKind::Product);
        create_product(&conn, &product_input(&category.id, "NET-1")).unwrap();

        let err = create_product(&conn, &product_input(&category.id, "net-1")).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref e) if e.has("sku")));
    }

    #[test]
    fn test_price_validation() {
        let conn = test_connection();
        let category = create_test_category(&conn, "Internet", CategoryKind::Product);
        let product = create_product(&conn, &product_input(&category.id, "NET-1")).unwrap();

        let err = create_price(
            &conn,
            &product.id,
            &PriceInput {
                name: None,
                monthly_price: Some(dec!(-5)),
                setup_fee: Some(dec!(-1)),
                min_months: Some(0),
                is_active: None,
            },
        )
        .unwrap_err();

        match err {
            AppError::Validation(errors) => {
                assert_eq!(
                    errors.fields(),
                    vec!["min_months", "monthly_price", "name", "setup_fee"]
                );
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_list_products_filters() {
        let conn = test_connection();
        let category = create_test_category(&conn, "Internet", CategoryKind::Product);
        create_product(&conn, &product_input(&category.id, "NET-1")).unwrap();
        let mut inactive = product_input(&category.id, "TV-1");
        inactive.name = Some("TV Kabel".to_string());
        inactive.is_active = Some(false);
        create_product(&conn, &inactive).unwrap();

        let active = list_products(
            &conn,
            &ProductFilter { active: Some(true), ..Default::default() },
        )
        .unwrap();
        assert_eq!(active.len(), 1);

        let search = list_products(
            &conn,
            &ProductFilter { search: Some("tv".to_string()), ..Default::default() },
        )
        .unwrap();
        assert_eq!(search.len(), 1);
        assert_eq!(search[0].sku, "TV-1");
    }

    #[test]
    fn test_price_scoped_to_product() {
        let conn = test_connection();
        let price = create_test_price(&conn, dec!(100000), dec!(0), 1);
        let other = create_test_price(&conn, dec!(200000), dec!(0), 1);

        assert!(get_product_price(&conn, &price.product_id, &price.id).is_ok());
        assert!(matches!(
            get_product_price(&conn, &other.product_id, &price.id),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_product_cascades_prices() {
        let conn = test_connection();
        let price = create_test_price(&conn, dec!(100000), dec!(50000), 3);

        delete_product(&conn, &price.product_id).unwrap();
        assert!(matches!(get_price(&conn, &price.id), Err(AppError::NotFound(_))));
    }
}
