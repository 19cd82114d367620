// HTTP API - axum router, shared state and the JSON envelope
//
// Every response is `{"success": bool, "data": ..., "meta"?, "error"?, "errors"?}`.
// Handlers only extract, authorize, call into `entities` and shape.

pub mod auth;
pub mod error;
pub mod handlers;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};
use rusqlite::Connection;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::pagination::{PageMeta, Paginated};
use crate::permissions::Role;
use crate::validation::ValidationErrors;
use handlers::{budgets, catalog, offers, split_bills, subscriptions, system, users, wallets};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub auth_enabled: bool,
}

impl AppState {
    pub fn new(conn: Connection, auth_enabled: bool) -> Self {
        AppState { db: Arc::new(Mutex::new(conn)), auth_enabled }
    }

    /// Lock the connection. A handler that panicked mid-request leaves
    /// SQLite consistent (open transactions roll back on drop), so a
    /// poisoned lock is still usable.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// Response envelope
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), meta: None, message: None, error: None, errors: None }
    }

    pub fn page(page: Paginated<T>) -> ApiResponse<Vec<T>> {
        ApiResponse {
            success: true,
            data: Some(page.items),
            meta: Some(page.meta),
            message: None,
            error: None,
            errors: None,
        }
    }

    pub fn failure(error: impl Into<String>, errors: Option<ValidationErrors>) -> Self {
        Self { success: false, data: None, meta: None, message: None, error: Some(error.into()), errors }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self { success: true, data: None, meta: None, message: Some(message.into()), error: None, errors: None }
    }
}

pub type Reply<T> = Result<Json<ApiResponse<T>>, AppError>;

pub fn reply<T>(data: T) -> Reply<T> {
    Ok(Json(ApiResponse::ok(data)))
}

pub fn reply_page<T>(page: Paginated<T>) -> Reply<Vec<T>> {
    Ok(Json(ApiResponse::page(page)))
}

/// 201 with the created resource
pub type Created<T> = Result<(StatusCode, Json<ApiResponse<T>>), AppError>;

pub fn created<T>(data: T) -> Created<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(data))))
}

// ============================================================================
// JSON body extractor
// ============================================================================

/// `Json<T>` whose rejections come back in the standard envelope.
pub struct Payload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Payload(value)),
            Err(rejection) => Err(rejection_to_error(rejection)),
        }
    }
}

fn rejection_to_error(rejection: JsonRejection) -> AppError {
    AppError::BadRequest(rejection.body_text())
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/me", get(system::me))
        // People
        .nest("/leads", users::role_routes(Role::Lead))
        .nest("/customers", users::role_routes(Role::Customer))
        .nest("/sales", users::role_routes(Role::Sales))
        .nest("/managers", users::role_routes(Role::Manager))
        .route("/users/:id/token", post(users::regenerate_token))
        // Catalog
        .route("/categories", get(catalog::list_categories).post(catalog::create_category))
        .route(
            "/categories/:id",
            get(catalog::get_category).put(catalog::update_category).delete(catalog::delete_category),
        )
        .route("/products", get(catalog::list_products).post(catalog::create_product))
        .route(
            "/products/:id",
            get(catalog::get_product).put(catalog::update_product).delete(catalog::delete_product),
        )
        .route("/products/:id/prices", get(catalog::list_prices).post(catalog::create_price))
        .route(
            "/products/:id/prices/:price_id",
            put(catalog::update_price).delete(catalog::delete_price),
        )
        // Sales pipeline
        .route("/offers", get(offers::list).post(offers::create))
        .route("/offers/:id", get(offers::show).put(offers::update).delete(offers::destroy))
        .route("/offers/:id/accept", post(offers::accept))
        .route("/offers/:id/reject", post(offers::reject))
        .route("/subscriptions", get(subscriptions::list).post(subscriptions::create))
        .route(
            "/subscriptions/:id",
            get(subscriptions::show).put(subscriptions::update).delete(subscriptions::destroy),
        )
        .route("/subscriptions/:id/approve", post(subscriptions::approve))
        .route("/subscriptions/:id/reject", post(subscriptions::reject))
        .route("/subscriptions/:id/cancel", post(subscriptions::cancel))
        // Personal finance
        .route("/wallets", get(wallets::list).post(wallets::create))
        .route("/wallets/:id", get(wallets::show).put(wallets::update).delete(wallets::destroy))
        .route("/wallets/:id/members", get(wallets::members).post(wallets::add_member))
        .route("/wallets/:id/members/:user_id", delete(wallets::remove_member))
        .route(
            "/wallets/:id/transactions",
            get(wallets::list_transactions).post(wallets::record_transaction),
        )
        .route("/wallets/:id/summary", get(wallets::summary))
        .route("/wallets/:id/import", post(wallets::import_csv))
        .route("/transfers", post(wallets::transfer))
        .route("/transactions/:id", delete(wallets::delete_transaction))
        .route("/budget-plans", get(budgets::list).post(budgets::create))
        .route("/budget-plans/:id", get(budgets::show).put(budgets::update).delete(budgets::destroy))
        .route("/budget-plans/:id/summary", get(budgets::summary))
        .route("/budget-plans/:id/items", post(budgets::add_item))
        .route(
            "/budget-plans/:id/items/:item_id",
            put(budgets::update_item).delete(budgets::delete_item),
        )
        .route("/split-bills", get(split_bills::list).post(split_bills::create))
        .route(
            "/split-bills/:id",
            get(split_bills::show).put(split_bills::update).delete(split_bills::destroy),
        )
        .route("/split-bills/:id/participants/:pid/paid", post(split_bills::toggle_paid))
        // Back office
        .route("/dashboard", get(system::dashboard))
        .route("/events/:entity_type/:entity_id", get(system::events))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_user));

    let api = Router::new().route("/health", get(system::health)).merge(protected);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
