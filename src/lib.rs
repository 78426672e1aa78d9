//! Fintrack is a web service for tracking personal income and spending.
//!
//! This library provides a JSON REST API for registering users, recording
//! categorized transactions, parsing uploaded receipts through an external
//! document-understanding service, and viewing aggregated financial reports.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod app_state;
mod auth;
mod category;
mod database_id;
mod db;
mod endpoints;
mod pagination;
mod password;
mod receipts;
mod reports;
mod routing;
mod transaction;
mod user;

pub use app_state::AppState;
pub use db::initialize as initialize_db;
pub use password::PasswordHash;
pub use receipts::{DEFAULT_GEMINI_MODEL, GeminiConfig};
pub use routing::build_router;
pub use user::{User, UserID};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The user tried to register with an email that belongs to an existing
    /// account.
    #[error("Email already registered")]
    EmailTaken,

    /// The user provided an email/password combination that does not match a
    /// registered account. Unknown emails and wrong passwords produce the
    /// same error so that account existence cannot be probed.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The bearer token was missing, malformed, expired, or failed the
    /// signature check.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// The presented refresh token decoded correctly but is not in the
    /// refresh token ledger, meaning it was rotated out or revoked by a
    /// logout.
    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    /// The token was valid but the account it refers to no longer exists.
    #[error("User not found")]
    UserNotFound,

    /// An unexpected error occurred during login.
    ///
    /// The underlying cause is logged on the server and never shown to the
    /// client.
    #[error("An error occurred during login. Please try again later.")]
    LoginFailed,

    /// The string provided at registration could not be parsed as an email
    /// address.
    #[error("Invalid email address")]
    InvalidEmail,

    /// An empty string was used to create or rename a category.
    #[error("Category name cannot be empty")]
    EmptyCategoryName,

    /// A transaction was submitted without a category.
    #[error("Category ID is required.")]
    CategoryRequired,

    /// A transaction was submitted without a merchant.
    #[error("Merchant is required.")]
    MerchantRequired,

    /// The category ID on a transaction does not refer to an existing
    /// category.
    #[error("Invalid category ID.")]
    InvalidCategoryId,

    /// A foreign key on the submitted record does not refer to an existing
    /// row.
    #[error("Invalid reference to a related record")]
    InvalidForeignKey,

    /// A query or path parameter fell outside its documented bounds.
    #[error("{0}")]
    InvalidParameter(String),

    /// The requested category does not exist or belongs to another user.
    ///
    /// The two cases are deliberately indistinguishable so that IDs cannot
    /// be probed across accounts.
    #[error("Category not found")]
    CategoryNotFound,

    /// The requested transaction does not exist or belongs to another user.
    #[error("Transaction not found")]
    TransactionNotFound,

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An uploaded receipt had a MIME type outside the supported set.
    #[error("Unsupported file type {0}. Allowed: PDF/JPEG/PNG/WEBP/TIFF.")]
    UnsupportedFileType(String),

    /// The multipart form did not contain a file.
    #[error("No file provided")]
    MissingFile,

    /// The multipart form could not be parsed.
    #[error("Could not parse multipart form: {0}")]
    MultipartError(String),

    /// The external document parsing service returned an error or a response
    /// the gateway could not interpret.
    ///
    /// The error string should only be logged for debugging on the server,
    /// never returned to the client.
    #[error("receipt parsing failed: {0}")]
    ParseServiceError(String),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// Signing a new JWT failed.
    #[error("could not create an auth token")]
    TokenCreation,

    /// Could not acquire the database lock.
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.contains("user.email") =>
            {
                Error::EmailTaken
            }
            // Code 787 occurs when a FOREIGN KEY constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, _) if sql_error.extended_code == 787 => {
                Error::InvalidForeignKey
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::EmailTaken => StatusCode::CONFLICT,
            Error::InvalidCredentials
            | Error::InvalidToken
            | Error::InvalidRefreshToken
            | Error::UserNotFound => StatusCode::UNAUTHORIZED,
            Error::InvalidEmail
            | Error::EmptyCategoryName
            | Error::CategoryRequired
            | Error::MerchantRequired
            | Error::InvalidCategoryId
            | Error::InvalidForeignKey
            | Error::UnsupportedFileType(_)
            | Error::MultipartError(_) => StatusCode::BAD_REQUEST,
            Error::InvalidParameter(_) | Error::MissingFile => StatusCode::UNPROCESSABLE_ENTITY,
            Error::CategoryNotFound | Error::TransactionNotFound | Error::NotFound => {
                StatusCode::NOT_FOUND
            }
            Error::LoginFailed
            | Error::ParseServiceError(_)
            | Error::HashingError(_)
            | Error::TokenCreation
            | Error::DatabaseLockError
            | Error::SqlError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Internal errors are logged with their detail and replaced with a
        // generic message so nothing sensitive leaks to the client.
        let message = match &self {
            Error::ParseServiceError(_) => {
                tracing::error!("{}", self);
                "Receipt parsing failed".to_owned()
            }
            Error::HashingError(_)
            | Error::TokenCreation
            | Error::DatabaseLockError
            | Error::SqlError(_) => {
                tracing::error!("An unexpected error occurred: {}", self);
                "An unexpected error occurred".to_owned()
            }
            error => error.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod error_tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use crate::Error;

    #[test]
    fn sql_unique_email_error_maps_to_email_taken() {
        let error = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::ConstraintViolation,
                extended_code: 2067,
            },
            Some("UNIQUE constraint failed: user.email".to_owned()),
        );

        assert_eq!(Error::from(error), Error::EmailTaken);
    }

    #[test]
    fn sql_foreign_key_error_maps_to_invalid_foreign_key() {
        let error = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::ConstraintViolation,
                extended_code: 787,
            },
            Some("FOREIGN KEY constraint failed".to_owned()),
        );

        assert_eq!(Error::from(error), Error::InvalidForeignKey);
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        assert_eq!(
            Error::from(rusqlite::Error::QueryReturnedNoRows),
            Error::NotFound
        );
    }

    #[test]
    fn auth_errors_respond_with_unauthorized() {
        for error in [
            Error::InvalidCredentials,
            Error::InvalidToken,
            Error::InvalidRefreshToken,
            Error::UserNotFound,
        ] {
            let response = error.into_response();

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn duplicate_email_responds_with_conflict() {
        let response = Error::EmailTaken.into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn internal_errors_respond_with_internal_server_error() {
        let response = Error::TokenCreation.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
