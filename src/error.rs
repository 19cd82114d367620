// Error model shared by the library, the CLI and the HTTP layer

use crate::validation::ValidationErrors;
use rusqlite::ErrorCode;

/// Everything a domain operation can fail with.
///
/// The HTTP layer maps each variant onto a status code; the CLI just prints
/// the `Display` text.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Data yang diberikan tidak valid.")]
    Validation(ValidationErrors),

    #[error("{0} tidak ditemukan.")]
    NotFound(&'static str),

    #[error("Silakan login terlebih dahulu.")]
    Unauthenticated,

    #[error("Anda tidak memiliki akses untuk tindakan ini.")]
    Forbidden,

    #[error("{0}")]
    Conflict(String),

    #[error("Permintaan tidak valid: {0}")]
    BadRequest(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::default();
        errors.add(field, message);
        AppError::Validation(errors)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => AppError::NotFound("Data"),
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
                AppError::Conflict(
                    "Data masih digunakan oleh data lain atau melanggar batasan unik.".to_string(),
                )
            }
            _ => AppError::Database(err),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
