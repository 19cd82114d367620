// People: leads, customers, sales and managers
//
// The four role collections share one set of handlers; the role is fixed
// per nested router and decides both the permission and the row filter.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::entities::user::{self, CreatedUser, User, UserInput};
use crate::error::AppError;
use crate::http::{created, reply, reply_page, ApiResponse, AppState, Created, Payload, Reply};
use crate::pagination::PageRequest;
use crate::permissions::{authorize, Permission, Role};

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub api_token: String,
}

pub fn role_routes(role: Role) -> Router<AppState> {
    let router = Router::new()
        .route(
            "/",
            get(
                move |State(state): State<AppState>,
                      Extension(actor): Extension<User>,
                      Query(page): Query<PageRequest>,
                      Query(query): Query<SearchQuery>| async move {
                    list(role, state, actor, page, query)
                },
            )
            .post(
                move |State(state): State<AppState>,
                      Extension(actor): Extension<User>,
                      Payload(input): Payload<UserInput>| async move {
                    create(role, state, actor, input)
                },
            ),
        )
        .route(
            "/:id",
            get(
                move |State(state): State<AppState>,
                      Extension(actor): Extension<User>,
                      Path(id): Path<String>| async move { show(role, state, actor, id) },
            )
            .put(
                move |State(state): State<AppState>,
                      Extension(actor): Extension<User>,
                      Path(id): Path<String>,
                      Payload(input): Payload<UserInput>| async move {
                    update(role, state, actor, id, input)
                },
            )
            .delete(
                move |State(state): State<AppState>,
                      Extension(actor): Extension<User>,
                      Path(id): Path<String>| async move { destroy(role, state, actor, id) },
            ),
        );

    if role == Role::Lead {
        router.route("/:id/convert", post(convert))
    } else {
        router
    }
}

fn list(role: Role, state: AppState, actor: User, page: PageRequest, query: SearchQuery) -> Reply<Vec<User>> {
    authorize(actor.role, role.managed_by())?;
    let conn = state.conn();
    reply_page(user::list_users(&conn, role, query.search.as_deref(), page)?)
}

fn create(role: Role, state: AppState, actor: User, input: UserInput) -> Created<CreatedUser> {
    authorize(actor.role, role.managed_by())?;
    let conn = state.conn();
    let created_user = user::create_user(&conn, &input, role)?;
    tracing::info!(actor = %actor.id, user_id = %created_user.user.id, role = role.as_str(), "user created via API");
    created(created_user)
}

fn show(role: Role, state: AppState, actor: User, id: String) -> Reply<User> {
    authorize(actor.role, role.managed_by())?;
    let conn = state.conn();
    reply(user::get_user_with_role(&conn, &id, role)?)
}

fn update(role: Role, state: AppState, actor: User, id: String, input: UserInput) -> Reply<User> {
    authorize(actor.role, role.managed_by())?;
    let conn = state.conn();
    reply(user::update_user(&conn, &id, role, &input)?)
}

fn destroy(role: Role, state: AppState, actor: User, id: String) -> Reply<()> {
    authorize(actor.role, role.managed_by())?;
    if actor.id == id {
        return Err(AppError::conflict("Tidak dapat menghapus akun sendiri."));
    }
    let conn = state.conn();
    user::delete_user(&conn, &id, role)?;
    Ok(Json(ApiResponse::message(format!("{} berhasil dihapus.", role.label()))))
}

/// POST /api/leads/:id/convert
pub async fn convert(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Reply<User> {
    authorize(actor.role, Permission::ManageLeads)?;
    let conn = state.conn();
    reply(user::convert_lead(&conn, &id, &actor)?)
}

/// POST /api/users/:id/token - anyone may rotate their own token; rotating
/// someone else's needs the permission that manages their role.
pub async fn regenerate_token(
    State(state): State<AppState>,
    Extension(actor): Extension<User>,
    Path(id): Path<String>,
) -> Reply<TokenResponse> {
    let conn = state.conn();
    if actor.id != id {
        let target = user::get_user(&conn, &id)?;
        authorize(actor.role, target.role.managed_by())?;
    }
    let api_token = user::regenerate_token(&conn, &id)?;
    tracing::info!(actor = %actor.id, user_id = %id, "api token regenerated");
    reply(TokenResponse { api_token })
}
