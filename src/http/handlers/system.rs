// Health, identity, dashboard and audit log

use axum::{
    extract::{Path, State},
    Extension,
};
use serde::Serialize;

use crate::dashboard::{self, DashboardStats};
use crate::db::{self, Event};
use crate::entities::user::User;
use crate::http::{reply, AppState, Reply};
use crate::permissions::{authorize, Permission};
use crate::pricing;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub database: &'static str,
}

/// GET /api/health - no authentication
pub async fn health(State(state): State<AppState>) -> Reply<Health> {
    let database = {
        let conn = state.conn();
        match conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)) {
            Ok(_) => "ok",
            Err(e) => {
                tracing::error!(error = %e, "health check query failed");
                "unavailable"
            }
        }
    };
    reply(Health { status: "ok", version: crate::VERSION, database })
}

pub async fn me(Extension(user): Extension<User>) -> Reply<User> {
    reply(user)
}

pub async fn dashboard(State(state): State<AppState>, Extension(user): Extension<User>) -> Reply<DashboardStats> {
    authorize(user.role, Permission::ViewDashboard)?;
    let conn = state.conn();
    reply(dashboard::dashboard_stats(&conn, pricing::today())?)
}

/// GET /api/events/:entity_type/:entity_id
pub async fn events(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Reply<Vec<Event>> {
    authorize(user.role, Permission::ViewAuditLog)?;
    let conn = state.conn();
    reply(db::get_events_for_entity(&conn, &entity_type, &entity_id)?)
}
