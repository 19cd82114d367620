// Offers: sales propose a price plan to a lead, the lead accepts or rejects

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Serialize;

use crate::entities::offer::{self, AcceptOfferInput, Offer, OfferFilter, OfferInput, RejectOfferInput};
use crate::entities::subscription::Subscription;
use crate::entities::user::User;
use crate::http::{created, reply, reply_page, ApiResponse, AppState, Created, Payload, Reply};
use crate::pagination::PageRequest;
use crate::permissions::{authorize, authorize_any, Permission};
use crate::pricing;

const VIEW: &[Permission] = &[Permission::ManageOffers, Permission::RespondOffers];

/// Leads answer their own offers; staff may record the answer for them.
const RESPOND: &[Permission] = &[Permission::RespondOffers, Permission::ManageOffers];

#[derive(Debug, Serialize)]
pub struct Accepted {
    pub offer: Offer,
    pub subscription: Subscription,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(page): Query<PageRequest>,
    Query(filter): Query<OfferFilter>,
) -> Reply<Vec<Offer>> {
    authorize_any(user.role, VIEW)?;
    let conn = state.conn();
    reply_page(offer::list_offers(&conn, &filter, &user, page)?)
}

pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<Offer> {
    authorize_any(user.role, VIEW)?;
    let conn = state.conn();
    reply(offer::get_offer_for(&conn, &id, &user)?)
}

pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Payload(input): Payload<OfferInput>,
) -> Created<Offer> {
    authorize(user.role, Permission::ManageOffers)?;
    let conn = state.conn();
    let offer = offer::create_offer(&conn, &input, &user, pricing::today())?;
    tracing::info!(actor = %user.id, offer_id = %offer.id, lead_id = %offer.lead_id, "offer created");
    created(offer)
}

pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    Payload(input): Payload<OfferInput>,
) -> Reply<Offer> {
    authorize(user.role, Permission::ManageOffers)?;
    let conn = state.conn();
    reply(offer::update_offer(&conn, &id, &input, pricing::today())?)
}

pub async fn destroy(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
) -> Reply<()> {
    authorize(user.role, Permission::ManageOffers)?;
    let conn = state.conn();
    offer::delete_offer(&conn, &id)?;
    Ok(Json(ApiResponse::message("Penawaran berhasil dihapus.")))
}

/// POST /api/offers/:id/accept - opens a pending subscription. The body is
/// optional; without one the subscription starts today.
pub async fn accept(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    body: Option<Payload<AcceptOfferInput>>,
) -> Created<Accepted> {
    authorize_any(user.role, RESPOND)?;
    let input = body.map(|Payload(input)| input).unwrap_or_default();
    let conn = state.conn();
    let current = offer::get_offer_for(&conn, &id, &user)?;
    let (offer, subscription) = offer::accept_offer(&conn, &current, &input, &user, pricing::today())?;
    tracing::info!(offer_id = %offer.id, subscription_id = %subscription.id, "offer accepted");
    created(Accepted { offer, subscription })
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<String>,
    body: Option<Payload<RejectOfferInput>>,
) -> Reply<Offer> {
    authorize_any(user.role, RESPOND)?;
    let input = body.map(|Payload(input)| input).unwrap_or_default();
    let conn = state.conn();
    let current = offer::get_offer_for(&conn, &id, &user)?;
    reply(offer::reject_offer(&conn, &current, &input, &user)?)
}
