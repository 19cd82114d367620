// AppError → HTTP response

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::ApiResponse;
use crate::error::AppError;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::Validation(errors) => {
                let summary = errors
                    .first_message()
                    .unwrap_or("Data yang diberikan tidak valid.")
                    .to_string();
                ApiResponse::<()>::failure(summary, Some(errors))
            }
            AppError::Database(ref e) => {
                tracing::error!(error = %e, "database error");
                ApiResponse::failure("Terjadi kesalahan pada server.", None)
            }
            AppError::Internal(ref e) => {
                tracing::error!(error = %e, "internal error");
                ApiResponse::failure("Terjadi kesalahan pada server.", None)
            }
            other => ApiResponse::failure(other.to_string(), None),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::invalid("name", "Nama wajib diisi.").status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::NotFound("Produk").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_validation_body_shape() {
        let response = AppError::invalid("email", "Format email tidak valid.").into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Format email tidak valid.");
        assert_eq!(body["errors"]["email"][0], "Format email tidak valid.");
        assert!(body.get("data").is_none());
    }
}
