//! A minimal client for the Gemini file and content APIs.
//!
//! Parsing a document takes two steps: a resumable upload (start, then
//! send-and-finalize) that yields a file URI, and a `generateContent` call
//! that asks the model to extract transactions from that file as JSON
//! constrained by a response schema.

use std::time::Duration;

use reqwest::header::CONTENT_LENGTH;
use serde_json::{Value, json};

use crate::Error;

/// The Gemini API host used outside of tests.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// The model used when no other model is configured.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// The response header that carries the URL for the second upload step.
const UPLOAD_URL_HEADER: &str = "X-Goog-Upload-URL";

const START_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const FINALIZE_UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);
const GENERATE_CONTENT_TIMEOUT: Duration = Duration::from_secs(120);

/// The instruction prompt sent alongside the uploaded document.
const EXTRACTION_PROMPT: &str = "You are a financial document parser. \
    Extract transactions. Dates must be YYYY-MM-DD. \
    Amount positive. Direction 'debit' or 'credit'. \
    Default currency INR if unknown. Return ONLY JSON.";

/// The settings for talking to the Gemini API.
#[derive(Clone)]
pub struct GeminiConfig {
    /// The API key, sent as a query parameter on every call.
    pub api_key: String,
    /// The model that parses documents.
    pub model: String,
    /// The API host. Overridable so tests can point at a local server.
    pub base_url: String,
}

impl GeminiConfig {
    /// Create the settings for the production API host.
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: DEFAULT_GEMINI_BASE_URL.to_owned(),
        }
    }
}

/// Upload a file to the Gemini file store and return its file URI.
///
/// # Errors
///
/// This function will return an error if either upload step fails, times
/// out, or responds without the expected upload URL header or file URI.
pub async fn upload_file(
    data: Vec<u8>,
    mime_type: &str,
    display_name: &str,
    http_client: &reqwest::Client,
    config: &GeminiConfig,
) -> Result<String, Error> {
    let start_url = format!(
        "{}/upload/v1beta/files?key={}",
        config.base_url, config.api_key
    );
    let start_response = http_client
        .post(&start_url)
        .timeout(START_UPLOAD_TIMEOUT)
        .header("X-Goog-Upload-Protocol", "resumable")
        .header("X-Goog-Upload-Command", "start")
        .header("X-Goog-Upload-Header-Content-Length", data.len().to_string())
        .header("X-Goog-Upload-Header-Content-Type", mime_type)
        .json(&json!({ "file": { "display_name": display_name } }))
        .send()
        .await
        .map_err(|error| {
            Error::ParseServiceError(format!("the upload could not be started: {error}"))
        })?;

    let upload_url = match start_response.headers().get(UPLOAD_URL_HEADER) {
        Some(value) => value
            .to_str()
            .map_err(|error| {
                Error::ParseServiceError(format!("the upload URL header was unreadable: {error}"))
            })?
            .to_owned(),
        None => {
            let body = start_response.text().await.unwrap_or_default();
            return Err(Error::ParseServiceError(format!(
                "the upload start response did not include an upload URL: {body}"
            )));
        }
    };

    let finalize_response = http_client
        .post(&upload_url)
        .timeout(FINALIZE_UPLOAD_TIMEOUT)
        .header(CONTENT_LENGTH, data.len().to_string())
        .header("X-Goog-Upload-Offset", "0")
        .header("X-Goog-Upload-Command", "upload, finalize")
        .body(data)
        .send()
        .await
        .map_err(|error| {
            Error::ParseServiceError(format!("the upload could not be finalized: {error}"))
        })?;

    if !finalize_response.status().is_success() {
        let status = finalize_response.status();
        let body = finalize_response.text().await.unwrap_or_default();
        return Err(Error::ParseServiceError(format!(
            "the upload was rejected with HTTP {status}: {body}"
        )));
    }

    let file_info: Value = finalize_response.json().await.map_err(|error| {
        Error::ParseServiceError(format!("the upload response was not valid JSON: {error}"))
    })?;

    file_info
        .pointer("/file/uri")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| {
            Error::ParseServiceError(format!(
                "the upload response did not include a file URI: {file_info}"
            ))
        })
}

/// Ask the model to extract transactions from an uploaded file.
///
/// Returns the parsed JSON document with defaults filled in for the keys
/// the model sometimes omits (`currency`, `doc_type`, `transactions`).
///
/// # Errors
///
/// This function will return an error if the call fails, times out, or the
/// reply is not a JSON object in the expected envelope.
pub async fn parse_file(
    file_uri: &str,
    mime_type: &str,
    http_client: &reqwest::Client,
    config: &GeminiConfig,
) -> Result<Value, Error> {
    let url = format!(
        "{}/v1beta/models/{}:generateContent?key={}",
        config.base_url, config.model, config.api_key
    );
    // The Gemini REST API expects camelCase keys in these parts.
    let body = json!({
        "contents": [{
            "parts": [
                { "text": EXTRACTION_PROMPT },
                { "fileData": { "mimeType": mime_type, "fileUri": file_uri } },
            ],
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": response_schema(),
        },
    });

    let response = http_client
        .post(&url)
        .timeout(GENERATE_CONTENT_TIMEOUT)
        .json(&body)
        .send()
        .await
        .map_err(|error| {
            Error::ParseServiceError(format!("the parse request could not be sent: {error}"))
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(Error::ParseServiceError(format!(
            "the parse request was rejected with HTTP {status}: {body}"
        )));
    }

    let reply: Value = response.json().await.map_err(|error| {
        Error::ParseServiceError(format!("the model reply was not valid JSON: {error}"))
    })?;

    // The JSON document comes back as text in the first candidate.
    let text = reply
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            Error::ParseServiceError(format!("the model reply had an unexpected shape: {reply}"))
        })?;

    let mut document: Value = serde_json::from_str(text).map_err(|error| {
        Error::ParseServiceError(format!("the extracted document was not valid JSON: {error}"))
    })?;

    match document.as_object_mut() {
        Some(map) => {
            map.entry("currency").or_insert_with(|| Value::from("INR"));
            map.entry("doc_type")
                .or_insert_with(|| Value::from("unknown"));
            map.entry("transactions")
                .or_insert_with(|| Value::Array(Vec::new()));
        }
        None => {
            return Err(Error::ParseServiceError(format!(
                "the extracted document was not a JSON object: {document}"
            )));
        }
    }

    Ok(document)
}

/// The schema the model's JSON reply must follow.
fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "doc_type": {
                "type": "string",
                "enum": ["bank_statement", "invoice", "expense_sheet", "unknown"],
            },
            "currency": { "type": "string" },
            "summary": {
                "type": "object",
                "properties": {
                    "total_debits": { "type": "number" },
                    "total_credits": { "type": "number" },
                    "period_start": { "type": "string" },
                    "period_end": { "type": "string" },
                },
            },
            "transactions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "date": { "type": "string" },
                        "description": { "type": "string" },
                        "amount": { "type": "number" },
                        "direction": { "type": "string", "enum": ["debit", "credit"] },
                        "category": { "type": "string" },
                        "currency": { "type": "string" },
                    },
                    "required": ["date", "description", "amount", "direction"],
                },
            },
        },
        "required": ["transactions"],
    })
}

// ============================================================================
// TESTS
// ============================================================================
