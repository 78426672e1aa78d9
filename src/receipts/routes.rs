//! The receipt parsing endpoint and the receipt table.

use axum::{
    Json,
    extract::{FromRef, Multipart, State},
};
use rusqlite::Connection;

use crate::{AppState, Error};

use super::gemini::{GeminiConfig, parse_file, upload_file};

/// The MIME types the parsing endpoint accepts.
const SUPPORTED_MIME_TYPES: [&str; 5] = [
    "application/pdf",
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/tiff",
];

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// The state needed for parsing receipts.
#[derive(Clone)]
pub struct ReceiptState {
    /// The shared HTTP client for outbound calls.
    pub http_client: reqwest::Client,
    /// The settings for the Gemini API.
    pub gemini: GeminiConfig,
}

impl FromRef<AppState> for ReceiptState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            http_client: state.http_client.clone(),
            gemini: state.gemini.clone(),
        }
    }
}

/// A route handler that parses an uploaded financial document.
///
/// The `file` part of the multipart form is uploaded to the external
/// parsing service and the structured JSON extracted from it is returned
/// verbatim. Neither the file nor the result is stored.
///
/// # Errors
///
/// This function will return an error in the following situations:
/// - the form has no `file` part,
/// - the file's MIME type is not a supported document type,
/// - the parsing service is unreachable or returns an unusable reply.
pub async fn parse_receipt_endpoint(
    State(state): State<ReceiptState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, Error> {
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| Error::MultipartError(error.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_owned();
        let file_name = field.file_name().unwrap_or("document").to_owned();
        let data = field.bytes().await.map_err(|error| {
            tracing::error!("could not read data from multipart form field: {error}");
            Error::MultipartError("Could not read data from multipart form field.".to_owned())
        })?;

        file = Some((data, mime_type, file_name));
        break;
    }

    let Some((data, mime_type, file_name)) = file else {
        return Err(Error::MissingFile);
    };

    if !SUPPORTED_MIME_TYPES.contains(&mime_type.as_str()) {
        return Err(Error::UnsupportedFileType(mime_type));
    }

    tracing::debug!(
        "received file '{}' ({}, {} bytes) for parsing",
        file_name,
        mime_type,
        data.len()
    );

    let file_uri = upload_file(
        data.to_vec(),
        &mime_type,
        &file_name,
        &state.http_client,
        &state.gemini,
    )
    .await?;
    let document = parse_file(&file_uri, &mime_type, &state.http_client, &state.gemini).await?;

    Ok(Json(document))
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the receipt table in the database.
///
/// No endpoint writes to this table. It exists so that transactions can
/// reference receipt rows imported or backfilled by other tools.
///
/// # Errors
///
/// This function will return an error if there is an SQL error.
pub fn create_receipt_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS receipt (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            filename TEXT NOT NULL,
            file_path TEXT NOT NULL,
            uploaded_at TEXT NOT NULL,
            ocr_text TEXT,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_receipt_user_id ON receipt(user_id);",
    )?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
