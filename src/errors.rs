// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

// Kody błędów Postgresa, które mapujemy na 409
const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";
// Równoległe zapisy tych samych wierszy; klient może ponowić żądanie
const PG_SERIALIZATION_FAILURE: &str = "40001";
const PG_DEADLOCK_DETECTED: &str = "40P01";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Błąd SQLx: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Nie znaleziono zasobu")]
    NotFound,

    #[error("Błędy walidacji")]
    ValidationError(#[from] ValidationErrors),

    #[error("Nieprawidłowe dane wejściowe: {0}")]
    UnprocessableEntity(String),

    #[error("Email już istnieje: {0}")]
    EmailAlreadyExists(String),

    #[error("Nieprawidłowe dane logowania")]
    InvalidLoginCredentials,

    #[error("Brak wymaganego tokenu: {0}")]
    MissingToken(String),

    #[error("Token wygasł")]
    TokenExpired,

    #[error("Nieprawidłowy token: {0}")]
    InvalidToken(String),

    #[error("Nieautoryzowany dostęp: {0}")]
    UnauthorizedAccess(String),

    #[error("Wewnętrzny błąd serwera: {0}")]
    InternalServerError(String),

    #[error("Wystąpił konflikt: {0}")]
    Conflict(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::SqlxError(sqlx::Error::RowNotFound) => {
                (StatusCode::NOT_FOUND, "Nie znaleziono zasobu".to_string())
            }
            AppError::SqlxError(sqlx::Error::Database(db_error))
                if db_error.code().as_deref() == Some(PG_UNIQUE_VIOLATION) =>
            {
                tracing::warn!("Naruszenie unikalności: {:?}", db_error);
                (
                    StatusCode::CONFLICT,
                    "Zasób o takiej nazwie już istnieje".to_string(),
                )
            }
            AppError::SqlxError(sqlx::Error::Database(db_error))
                if db_error.code().as_deref() == Some(PG_FOREIGN_KEY_VIOLATION) =>
            {
                tracing::warn!("Naruszenie klucza obcego: {:?}", db_error);
                (
                    StatusCode::CONFLICT,
                    "Zasób jest powiązany z innymi rekordami".to_string(),
                )
            }
            AppError::SqlxError(sqlx::Error::Database(db_error))
                if matches!(
                    db_error.code().as_deref(),
                    Some(PG_SERIALIZATION_FAILURE | PG_DEADLOCK_DETECTED)
                ) =>
            {
                tracing::warn!("Konflikt równoległych zapisów: {:?}", db_error);
                (
                    StatusCode::CONFLICT,
                    "Zasób jest właśnie modyfikowany, spróbuj ponownie".to_string(),
                )
            }
            AppError::SqlxError(sqlx_error) => {
                tracing::error!("Błąd SQLx: {:?}", sqlx_error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Wystąpił wewnętrzny błąd serwera (baza danych)".to_string(),
                )
            }
            AppError::NotFound => (StatusCode::NOT_FOUND, "Nie znaleziono zasobu".to_string()),
            AppError::ValidationError(errors) => {
                let mut messages = Vec::new();
                for (field, field_errors) in errors.field_errors() {
                    for error in field_errors {
                        let msg = error.message.as_ref().map_or_else(
                            || format!("Pole '{}' jest nieprawidłowe", field),
                            |m| format!("Pole '{}': {}", field, m),
                        );
                        messages.push(msg);
                    }
                }
                (StatusCode::UNPROCESSABLE_ENTITY, messages.join("; "))
            }
            AppError::UnprocessableEntity(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            AppError::EmailAlreadyExists(message) => (StatusCode::CONFLICT, message),
            AppError::InvalidLoginCredentials => (
                StatusCode::UNAUTHORIZED,
                "Nieprawidłowe dane logowania".to_string(),
            ),
            AppError::MissingToken(message) => (StatusCode::UNAUTHORIZED, message),
            AppError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token wygasł".to_string()),
            AppError::InvalidToken(message) => (StatusCode::UNAUTHORIZED, message),
            AppError::UnauthorizedAccess(message) => (StatusCode::FORBIDDEN, message),
            AppError::InternalServerError(message) => {
                tracing::error!("Wewnętrzny błąd serwera: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Wystąpił wewnętrzny błąd serwera".to_string(),
                )
            }
            AppError::Conflict(message) => (StatusCode::CONFLICT, message),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::TokenExpired,
            _ => AppError::InvalidToken("Token JWT jest nieprawidłowy lub uszkodzony".to_string()),
        }
    }
}
