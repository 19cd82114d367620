// Category Entity - shared by the product catalog and the wallet ledger
//
// One table, three kinds: product categories group catalog items,
// income/expense categories classify wallet transactions and budget items.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::{enum_at, new_id};
use crate::error::{AppError, AppResult};
use crate::validation::Validator;

// ============================================================================
// CATEGORY KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    /// Groups catalog products
    Product,

    /// Money coming in
    Income,

    /// Money going out
    Expense,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Product => "product",
            CategoryKind::Income => "income",
            CategoryKind::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<CategoryKind> {
        match s {
            "product" => Some(CategoryKind::Product),
            "income" => Some(CategoryKind::Income),
            "expense" => Some(CategoryKind::Expense),
            _ => None,
        }
    }
}

// ============================================================================
// CATEGORY ENTITY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub kind: CategoryKind,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryInput {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub description: Option<String>,
}

fn category_from_row(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: enum_at(row, 2, CategoryKind::parse)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn validate(
    conn: &Connection,
    input: &CategoryInput,
    existing_id: Option<&str>,
) -> AppResult<(String, CategoryKind, Option<String>)> {
    let mut v = Validator::new();
    let name = v.required_str("name", "Nama kategori", input.name.as_deref(), 100);
    let kind = v.one_of("kind", "Jenis kategori", input.kind.as_deref(), CategoryKind::parse);
    let description = v.optional_str("description", "Deskripsi", input.description.as_deref(), 500);

    if let (Some(name), Some(kind)) = (&name, kind) {
        let duplicate: Option<String> = conn
            .query_row(
                "SELECT id FROM categories WHERE name = ?1 COLLATE NOCASE AND kind = ?2",
                params![name, kind.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if duplicate.is_some() && duplicate.as_deref() != existing_id {
            v.taken("name", "Nama kategori");
        }
    }

    v.finish()?;
    Ok((name.unwrap_or_default(), kind.unwrap_or(CategoryKind::Expense), description))
}

pub fn list_categories(conn: &Connection, kind: Option<CategoryKind>) -> AppResult<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, kind, description, created_at
         FROM categories
         WHERE ?1 IS NULL OR kind = ?1
         ORDER BY kind ASC, name ASC",
    )?;

    let categories = stmt
        .query_map([kind.map(|k| k.as_str())], category_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(categories)
}

pub fn get_category(conn: &Connection, id: &str) -> AppResult<Category> {
    conn.query_row(
        "SELECT id, name, kind, description, created_at FROM categories WHERE id = ?1",
        [id],
        category_from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound("Kategori"))
}

pub fn create_category(conn: &Connection, input: &CategoryInput) -> AppResult<Category> {
    let (name, kind, description) = validate(conn, input, None)?;
    let id = new_id();

    conn.execute(
        "INSERT INTO categories (id, name, kind, description, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, name, kind.as_str(), description, Utc::now()],
    )?;

    get_category(conn, &id)
}

pub fn update_category(conn: &Connection, id: &str, input: &CategoryInput) -> AppResult<Category> {
    let existing = get_category(conn, id)?;
    let (name, kind, description) = validate(conn, input, Some(id))?;

    // Re-kinding a category that is already in use would break the
    // product/ledger split, so only the name and description move freely.
    if kind != existing.kind && is_referenced(conn, id)? {
        return Err(AppError::invalid(
            "kind",
            "Jenis kategori tidak dapat diubah karena sudah digunakan.",
        ));
    }

    conn.execute(
        "UPDATE categories SET name = ?2, kind = ?3, description = ?4 WHERE id = ?1",
        params![id, name, kind.as_str(), description],
    )?;

    get_category(conn, id)
}

pub fn delete_category(conn: &Connection, id: &str) -> AppResult<()> {
    get_category(conn, id)?;
    if is_referenced(conn, id)? {
        return Err(AppError::conflict(
            "Kategori tidak dapat dihapus karena masih digunakan.",
        ));
    }
    conn.execute("DELETE FROM categories WHERE id = ?1", [id])?;
    Ok(())
}

fn is_referenced(conn: &Connection, id: &str) -> AppResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM products WHERE category_id = ?1)
             OR EXISTS(SELECT 1 FROM transactions WHERE category_id = ?1)
             OR EXISTS(SELECT 1 FROM budget_items WHERE category_id = ?1)",
        [id],
        |row| row.get(0),
    )?)
}

/// Validation helper for other forms: the referenced category must exist
/// and be of `kind`. Records an error on `field` otherwise.
pub fn check_category_kind(
    conn: &Connection,
    v: &mut Validator,
    field: &str,
    id: &str,
    kind: CategoryKind,
) -> AppResult<()> {
    match get_category(conn, id) {
        Ok(category) if category.kind == kind => {}
        Ok(_) | Err(AppError::NotFound(_)) => v.not_exists(field, "Kategori"),
        Err(e) => return Err(e),
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn create_test_category(conn: &Connection, name: &str, kind: CategoryKind) -> Category {
    create_category(
        conn,
        &CategoryInput {
            name: Some(name.to_string()),
            kind: Some(kind.as_str().to_string()),
            description: None,
        },
    )
    .unwrap()
}
