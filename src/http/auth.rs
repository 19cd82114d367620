// API token authentication
//
// Tokens arrive as `Authorization: Bearer <token>` or `X-API-Key: <token>`.
// The resolved `User` is placed in the request extensions for handlers.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use super::AppState;
use crate::entities::user::{self, User};
use crate::error::{AppError, AppResult};

fn presented_token(req: &Request) -> Option<String> {
    req.headers()
        .get("X-API-Key")
        .or_else(|| req.headers().get(header::AUTHORIZATION))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.strip_prefix("Bearer ").unwrap_or(s).trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the caller. With authentication disabled a request without a
/// token runs as the anonymous admin; a token, when given, is still honored.
fn resolve_user(state: &AppState, token: Option<&str>) -> AppResult<User> {
    let conn = state.conn();
    match token {
        Some(token) => match user::find_by_token(&conn, token)? {
            Some(user) => Ok(user),
            None => {
                tracing::warn!("invalid API token presented");
                Err(AppError::Unauthenticated)
            }
        },
        None if !state.auth_enabled => user::ensure_anonymous_admin(&conn),
        None => Err(AppError::Unauthenticated),
    }
}

pub async fn require_user(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let token = presented_token(&req);
    let user = resolve_user(&state, token.as_deref())?;

    tracing::debug!(user_id = %user.id, role = user.role.as_str(), "authenticated request");
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
