//! Authentication middleware that validates bearer tokens and resolves the
//! current user.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::DecodingKey;
use rusqlite::Connection;

use crate::{AppState, Error, auth::token::decode_token, user::{UserID, get_user_by_email}};

/// The state needed for the auth middleware.
#[derive(Clone)]
pub struct AuthState {
    /// The key for validating access token signatures.
    pub decoding_key: DecodingKey,
    /// The connection to the application database.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            decoding_key: state.decoding_key.clone(),
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The authenticated user attached to a request by [auth_guard].
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUser {
    /// The ID of the authenticated user.
    pub user_id: UserID,
    /// The email address of the authenticated user.
    pub email: String,
}

/// Middleware function that checks for a valid bearer token and that the
/// user it was issued to still exists.
///
/// The resolved identity is placed into the request and then the request
/// executed normally if the token is valid, otherwise a 401 response is
/// returned.
///
/// **Note**: Route handlers behind this guard can use the function argument
/// `Extension(user): Extension<CurrentUser>` to receive the identity.
pub async fn auth_guard(
    State(state): State<AuthState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, Error> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or(Error::InvalidToken)?;
    let claims = decode_token(bearer.token(), &state.decoding_key)?;

    // The lookup runs on every request so that deleting a user immediately
    // locks out their outstanding tokens.
    let user = {
        let connection = state
            .db_connection
            .lock()
            .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
            .map_err(|_| Error::DatabaseLockError)?;

        get_user_by_email(&claims.sub, &connection).map_err(|error| match error {
            Error::NotFound => Error::UserNotFound,
            error => error,
        })?
    };

    request.extensions_mut().insert(CurrentUser {
        user_id: user.id,
        email: user.email.to_string(),
    });

    Ok(next.run(request).await)
}
