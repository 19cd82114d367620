// Catalog: categories, products and their price plans

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::entities::category::{self, Category, CategoryInput, CategoryKind};
use crate::entities::product::{self, PriceInput, Product, ProductFilter, ProductInput, ProductPrice};
use crate::entities::user::User;
use crate::error::AppError;
use crate::http::{created, reply, ApiResponse, AppState, Created, Payload, Reply};
use crate::permissions::{authorize, Permission};

#[derive(Debug, Default, Deserialize)]
pub struct CategoryQuery {
    pub kind: Option<String>,
}

// ============================================================================
// Categories
// ============================================================================

pub async fn list_categories(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<CategoryQuery>,
) -> Reply<Vec<Category>> {
    authorize(user.role, Permission::ViewCatalog)?;
    let kind = match query.kind.as_deref().filter(|k| !k.is_empty()) {
        Some(raw) => Some(
            CategoryKind::parse(raw)
                .ok_or_else(|| AppError::invalid("kind", "Jenis kategori yang dipilih tidak valid."))?,
        ),
        None => None,
    };
    let conn = state.conn();
    reply(category::list_categories(&conn, kind)?)
}

pub async fn get_category(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<Category> {
    authorize(user.role, Permission::ViewCatalog)?;
    let conn = state.conn();
    reply(category::get_category(&conn, &id)?)
}

pub async fn create_category(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Payload(input): Payload<CategoryInput>,
) -> Created<Category> {
    authorize(user.role, Permission::ManageCatalog)?;
    let conn = state.conn();
    let category = category::create_category(&conn, &input)?;
    tracing::info!(actor = %user.id, category_id = %category.id, "category created");
    created(category)
}

pub async fn update_category(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Payload(input): Payload<CategoryInput>,
) -> Reply<Category> {
    authorize(user.role, Permission::ManageCatalog)?;
    let conn = state.conn();
    reply(category::update_category(&conn, &id, &input)?)
}

pub async fn delete_category(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<()> {
    authorize(user.role, Permission::ManageCatalog)?;
    let conn = state.conn();
    category::delete_category(&conn, &id)?;
    tracing::info!(actor = %user.id, category_id = %id, "category deleted");
    Ok(Json(ApiResponse::message("Kategori berhasil dihapus.")))
}

// ============================================================================
// Products
// ============================================================================

/// Non-staff only ever see active products.
pub async fn list_products(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(mut filter): Query<ProductFilter>,
) -> Reply<Vec<Product>> {
    authorize(user.role, Permission::ViewCatalog)?;
    if !user.is_staff() {
        filter.active = Some(true);
    }
    let conn = state.conn();
    reply(product::list_products(&conn, &filter)?)
}

pub async fn get_product(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<Product> {
    authorize(user.role, Permission::ViewCatalog)?;
    let conn = state.conn();
    let mut product = product::get_product(&conn, &id)?;
    if !user.is_staff() {
        if !product.is_active {
            return Err(AppError::NotFound("Produk"));
        }
        product.prices.retain(|p| p.is_active);
    }
    reply(product)
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Payload(input): Payload<ProductInput>,
) -> Created<Product> {
    authorize(user.role, Permission::ManageCatalog)?;
    let conn = state.conn();
    let product = product::create_product(&conn, &input)?;
    tracing::info!(actor = %user.id, product_id = %product.id, sku = %product.sku, "product created");
    created(product)
}

pub async fn update_product(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Payload(input): Payload<ProductInput>,
) -> Reply<Product> {
    authorize(user.role, Permission::ManageCatalog)?;
    let conn = state.conn();
    reply(product::update_product(&conn, &id, &input)?)
}

pub async fn delete_product(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<()> {
    authorize(user.role, Permission::ManageCatalog)?;
    let conn = state.conn();
    product::delete_product(&conn, &id)?;
    tracing::info!(actor = %user.id, product_id = %id, "product deleted");
    Ok(Json(ApiResponse::message("Produk berhasil dihapus.")))
}

// ============================================================================
// Prices
// ============================================================================

pub async fn list_prices(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(product_id): Path<String>,
) -> Reply<Vec<ProductPrice>> {
    authorize(user.role, Permission::ViewCatalog)?;
    let conn = state.conn();
    product::get_product(&conn, &product_id)?;
    let mut prices = product::list_prices(&conn, &product_id)?;
    if !user.is_staff() {
        prices.retain(|p| p.is_active);
    }
    reply(prices)
}

pub async fn create_price(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(product_id): Path<String>,
    Payload(input): Payload<PriceInput>,
) -> Created<ProductPrice> {
    authorize(user.role, Permission::ManageCatalog)?;
    let conn = state.conn();
    created(product::create_price(&conn, &product_id, &input)?)
}

pub async fn update_price(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((product_id, price_id)): Path<(String, String)>,
    Payload(input): Payload<PriceInput>,
) -> Reply<ProductPrice> {
    authorize(user.role, Permission::ManageCatalog)?;
    let conn = state.conn();
    reply(product::update_price(&conn, &product_id, &price_id, &input)?)
}

pub async fn delete_price(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((product_id, price_id)): Path<(String, String)>,
) -> Reply<()> {
    authorize(user.role, Permission::ManageCatalog)?;
    let conn = state.conn();
    product::delete_price(&conn, &product_id, &price_id)?;
    Ok(Json(ApiResponse::message("Paket harga berhasil dihapus.")))
}
