//! Implements a struct that holds the state of the REST server.

use std::sync::{Arc, Mutex};

use jsonwebtoken::{DecodingKey, EncodingKey};
use rusqlite::Connection;

use crate::{Error, db::initialize, receipts::GeminiConfig};

/// The state of the REST server.
#[derive(Clone)]
pub struct AppState {
    /// The key for signing access and refresh tokens.
    pub encoding_key: EncodingKey,

    /// The key for validating access and refresh token signatures.
    pub decoding_key: DecodingKey,

    /// The HTTP client shared by handlers that call external services.
    pub http_client: reqwest::Client,

    /// How to reach the receipt parsing service.
    pub gemini: GeminiConfig,

    /// The database connection
    pub db_connection: Arc<Mutex<Connection>>,
}

impl AppState {
    /// Create a new [AppState] with a SQLite database connection.
    ///
    /// This function will initialize the database by adding the tables for
    /// the domain models. `token_secret` signs the tokens this server
    /// issues, so changing it invalidates every token in circulation.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(
        db_connection: Connection,
        token_secret: &str,
        gemini: GeminiConfig,
    ) -> Result<Self, Error> {
        initialize(&db_connection)?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(token_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(token_secret.as_bytes()),
            http_client: reqwest::Client::new(),
            gemini,
            db_connection: Arc::new(Mutex::new(db_connection)),
        })
    }
}
