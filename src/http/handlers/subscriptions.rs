// Subscriptions: listing, staff entry and the approval workflow

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};

use crate::entities::subscription::{
    self, DecisionInput, Subscription, SubscriptionFilter, SubscriptionInput, SubscriptionUpdateInput,
};
use crate::entities::user::User;
use crate::http::{created, reply, reply_page, ApiResponse, AppState, Created, Payload, Reply};
use crate::pagination::PageRequest;
use crate::permissions::{authorize, authorize_any, Permission};

const VIEW: &[Permission] = &[Permission::ManageSubscriptions, Permission::RespondOffers];

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(page): Query<PageRequest>,
    Query(filter): Query<SubscriptionFilter>,
) -> Reply<Vec<Subscription>> {
    authorize_any(user.role, VIEW)?;
    let conn = state.conn();
    reply_page(subscription::list_subscriptions(&conn, &filter, &user, page)?)
}

pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<Subscription> {
    authorize_any(user.role, VIEW)?;
    let conn = state.conn();
    reply(subscription::get_subscription_for(&conn, &id, &user)?)
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Payload(input): Payload<SubscriptionInput>,
) -> Created<Subscription> {
    authorize(user.role, Permission::ManageSubscriptions)?;
    let conn = state.conn();
    let subscription = subscription::create_subscription(&conn, &input, &user)?;
    tracing::info!(actor = %user.id, subscription_id = %subscription.id, "subscription created");
    created(subscription)
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Payload(input): Payload<SubscriptionUpdateInput>,
) -> Reply<Subscription> {
    authorize(user.role, Permission::ManageSubscriptions)?;
    let conn = state.conn();
    reply(subscription::update_subscription(&conn, &id, &input)?)
}

pub async fn destroy(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<()> {
    authorize(user.role, Permission::ManageSubscriptions)?;
    let conn = state.conn();
    subscription::delete_subscription(&conn, &id)?;
    Ok(Json(ApiResponse::message("Langganan berhasil dihapus.")))
}

// ============================================================================
// Decisions
// ============================================================================

pub async fn approve(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    body: Option<Payload<DecisionInput>>,
) -> Reply<Subscription> {
    authorize(user.role, Permission::ApproveSubscriptions)?;
    let input = body.map(|Payload(input)| input).unwrap_or_default();
    let conn = state.conn();
    let approved = subscription::approve_subscription(&conn, &id, &user, &input)?;
    tracing::info!(actor = %user.id, subscription_id = %id, "subscription approved");
    reply(approved)
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    body: Option<Payload<DecisionInput>>,
) -> Reply<Subscription> {
    authorize(user.role, Permission::ApproveSubscriptions)?;
    let input = body.map(|Payload(input)| input).unwrap_or_default();
    let conn = state.conn();
    reply(subscription::reject_subscription(&conn, &id, &user, &input)?)
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    body: Option<Payload<DecisionInput>>,
) -> Reply<Subscription> {
    authorize(user.role, Permission::ManageSubscriptions)?;
    let input = body.map(|Payload(input)| input).unwrap_or_default();
    let conn = state.conn();
    reply(subscription::cancel_subscription(&conn, &id, &user, &input)?)
}
