//! The account endpoints: register, log in, refresh, me and log out.

use std::{
    str::FromStr,
    sync::{Arc, Mutex},
};

use axum::{Extension, Json, extract::{FromRef, State}};
use email_address::EmailAddress;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    AppState, Error,
    auth::{
        middleware::CurrentUser,
        refresh::{
            delete_refresh_token, delete_user_refresh_tokens, refresh_token_exists,
            store_refresh_token,
        },
        token::{decode_token, issue_token},
    },
    password::PasswordHash,
    user::{create_user, get_user_by_email},
};

/// The state needed for the account endpoints.
#[derive(Clone)]
pub struct AccountState {
    /// The connection to the application database.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The key for signing access tokens.
    pub encoding_key: EncodingKey,
    /// The key for validating access token signatures.
    pub decoding_key: DecodingKey,
}

impl FromRef<AppState> for AccountState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            encoding_key: state.encoding_key.clone(),
            decoding_key: state.decoding_key.clone(),
        }
    }
}

/// The data for registering a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterData {
    /// The email address to register. Must be a well-formed address.
    pub email: String,
    /// The password for the new account.
    pub password: String,
    /// The display name for the new account.
    pub full_name: Option<String>,
}

/// The data for logging in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogInData {
    /// The email address of the account.
    pub email: String,
    /// The password of the account.
    pub password: String,
}

/// The data for exchanging a token for a fresh one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshData {
    /// A previously issued token whose digest is still in the ledger.
    pub refresh_token: String,
}

/// The body returned by the register, log-in and refresh endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The signed bearer token.
    pub access_token: String,
    /// The token scheme, always "bearer".
    pub token_type: String,
}

impl TokenResponse {
    fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_owned(),
        }
    }
}

/// A route handler for registering a new account.
///
/// On success the new user is logged in: a token is issued and recorded in
/// the refresh-token ledger.
pub async fn register_endpoint(
    State(state): State<AccountState>,
    Json(register_data): Json<RegisterData>,
) -> Result<Json<TokenResponse>, Error> {
    let email = EmailAddress::from_str(&register_data.email).map_err(|_| Error::InvalidEmail)?;
    let password_hash =
        PasswordHash::from_raw_password(&register_data.password, PasswordHash::DEFAULT_COST)?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let user = create_user(
        email,
        password_hash,
        register_data.full_name.as_deref(),
        &connection,
    )?;

    let token = issue_token(user.email.as_str(), &state.encoding_key)?;
    store_refresh_token(&token, user.id, &connection)?;

    Ok(Json(TokenResponse::bearer(token)))
}

/// A route handler for logging in with an email and password.
///
/// An unknown email and a wrong password produce the same error so that the
/// response does not reveal which accounts exist.
pub async fn log_in_endpoint(
    State(state): State<AccountState>,
    Json(log_in_data): Json<LogInData>,
) -> Result<Json<TokenResponse>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let user = get_user_by_email(&log_in_data.email, &connection).map_err(|error| match error {
        Error::NotFound => Error::InvalidCredentials,
        error => error,
    })?;

    match user.password_hash.verify(&log_in_data.password) {
        Ok(true) => {}
        Ok(false) => return Err(Error::InvalidCredentials),
        Err(error) => {
            tracing::error!("an error occurred while verifying a password: {error}");
            return Err(Error::LoginFailed);
        }
    }

    let token = issue_token(user.email.as_str(), &state.encoding_key)?;
    store_refresh_token(&token, user.id, &connection)?;

    Ok(Json(TokenResponse::bearer(token)))
}

/// A route handler for exchanging a token for a fresh one.
///
/// The presented token must decode cleanly and its digest must still be in
/// the ledger. On success the old ledger row is replaced by the new one, so
/// each token can be exchanged at most once.
pub async fn refresh_endpoint(
    State(state): State<AccountState>,
    Json(refresh_data): Json<RefreshData>,
) -> Result<Json<TokenResponse>, Error> {
    let claims = decode_token(&refresh_data.refresh_token, &state.decoding_key)
        .map_err(|_| Error::InvalidRefreshToken)?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    if !refresh_token_exists(&refresh_data.refresh_token, &connection)? {
        return Err(Error::InvalidRefreshToken);
    }

    let user = get_user_by_email(&claims.sub, &connection).map_err(|error| match error {
        Error::NotFound => Error::InvalidRefreshToken,
        error => error,
    })?;

    delete_refresh_token(&refresh_data.refresh_token, &connection)?;
    let token = issue_token(user.email.as_str(), &state.encoding_key)?;
    store_refresh_token(&token, user.id, &connection)?;

    Ok(Json(TokenResponse::bearer(token)))
}

/// A route handler that returns the identity claim of the caller.
pub async fn me_endpoint(Extension(user): Extension<CurrentUser>) -> Json<serde_json::Value> {
    Json(json!({ "email": user.email }))
}

/// A route handler for logging out.
///
/// Deletes every ledger row belonging to the caller, which invalidates all
/// of their outstanding tokens for refresh purposes.
pub async fn log_out_endpoint(
    State(state): State<AccountState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    delete_user_refresh_tokens(user.user_id, &connection)?;

    Ok(Json(json!({ "message": "Logged out successfully" })))
}

#[cfg(test)]
mod account_endpoint_tests {
    use std::{
        str::FromStr,
        sync::{Arc, Mutex},
    };

    use axum::{Extension, Json, extract::State};
    use email_address::EmailAddress;
    use jsonwebtoken::{DecodingKey, EncodingKey, Header};
    use rusqlite::Connection;
    use time::{Duration, OffsetDateTime};

    use crate::{
        Error, PasswordHash,
        auth::{
            Claims, CurrentUser, decode_token, issue_token, refresh_token_exists,
            store_refresh_token,
        },
        db::initialize,
        user::{User, create_user, get_user_by_email},
    };

    use super::{
        AccountState, LogInData, RefreshData, RegisterData, log_in_endpoint, log_out_endpoint,
        me_endpoint, refresh_endpoint, register_endpoint,
    };

    const SECRET: &[u8] = b"the-quick-brown-fox";
    const TEST_EMAIL: &str = "averagejoe@example.com";

    fn get_test_state() -> AccountState {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).expect("Could not initialize database");

        AccountState {
            db_connection: Arc::new(Mutex::new(connection)),
            encoding_key: EncodingKey::from_secret(SECRET),
            decoding_key: DecodingKey::from_secret(SECRET),
        }
    }

    /// Insert a user directly with a cheap hash so tests skip the expensive
    /// registration path.
    fn insert_test_user(state: &AccountState, password: &str) -> User {
        let connection = state.db_connection.lock().unwrap();
        create_user(
            EmailAddress::from_str(TEST_EMAIL).unwrap(),
            PasswordHash::from_raw_password(password, 4).unwrap(),
            Some("Average Joe"),
            &connection,
        )
        .expect("Could not create test user")
    }

    #[tokio::test]
    async fn register_creates_user_and_returns_bearer_token() {
        let state = get_test_state();
        let register_data = RegisterData {
            email: TEST_EMAIL.to_owned(),
            password: "averysecurepassword".to_owned(),
            full_name: Some("Average Joe".to_owned()),
        };

        let Json(response) = register_endpoint(State(state.clone()), Json(register_data))
            .await
            .expect("Could not register");

        assert_eq!(response.token_type, "bearer");

        let claims = decode_token(&response.access_token, &state.decoding_key)
            .expect("registration should return a valid token");
        assert_eq!(claims.sub, TEST_EMAIL);

        let connection = state.db_connection.lock().unwrap();
        let user = get_user_by_email(TEST_EMAIL, &connection).expect("user should exist");
        assert_eq!(user.full_name, Some("Average Joe".to_owned()));
        assert_eq!(
            refresh_token_exists(&response.access_token, &connection),
            Ok(true)
        );
    }

    #[tokio::test]
    async fn register_rejects_invalid_email() {
        let state = get_test_state();
        let register_data = RegisterData {
            email: "definitely not an email".to_owned(),
            password: "averysecurepassword".to_owned(),
            full_name: None,
        };

        let result = register_endpoint(State(state), Json(register_data)).await;

        assert_eq!(result.unwrap_err(), Error::InvalidEmail);
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let state = get_test_state();
        insert_test_user(&state, "hunter2");
        let register_data = RegisterData {
            email: TEST_EMAIL.to_owned(),
            password: "averysecurepassword".to_owned(),
            full_name: None,
        };

        let result = register_endpoint(State(state), Json(register_data)).await;

        assert_eq!(result.unwrap_err(), Error::EmailTaken);
    }

    #[tokio::test]
    async fn log_in_succeeds_with_correct_credentials() {
        let state = get_test_state();
        let user = insert_test_user(&state, "hunter2");
        let log_in_data = LogInData {
            email: TEST_EMAIL.to_owned(),
            password: "hunter2".to_owned(),
        };

        let Json(response) = log_in_endpoint(State(state.clone()), Json(log_in_data))
            .await
            .expect("Could not log in");

        assert_eq!(response.token_type, "bearer");
        let claims = decode_token(&response.access_token, &state.decoding_key).unwrap();
        assert_eq!(claims.sub, user.email.to_string());
    }

    #[tokio::test]
    async fn log_in_rejects_unknown_email() {
        let state = get_test_state();
        let log_in_data = LogInData {
            email: "nosuchuser@example.com".to_owned(),
            password: "hunter2".to_owned(),
        };

        let result = log_in_endpoint(State(state), Json(log_in_data)).await;

        assert_eq!(result.unwrap_err(), Error::InvalidCredentials);
    }

    #[tokio::test]
    async fn log_in_rejects_wrong_password() {
        let state = get_test_state();
        insert_test_user(&state, "hunter2");
        let log_in_data = LogInData {
            email: TEST_EMAIL.to_owned(),
            password: "hunter3".to_owned(),
        };

        let result = log_in_endpoint(State(state), Json(log_in_data)).await;

        assert_eq!(result.unwrap_err(), Error::InvalidCredentials);
    }

    /// Encode a token with an issue time in the past so it differs from any
    /// token issued during the test run.
    fn encode_back_dated_token(state: &AccountState) -> String {
        let issued_at = OffsetDateTime::now_utc() - Duration::minutes(10);
        let claims = Claims {
            sub: TEST_EMAIL.to_owned(),
            iat: issued_at.unix_timestamp() as usize,
            exp: (issued_at + Duration::minutes(90)).unix_timestamp() as usize,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &state.encoding_key).unwrap()
    }

    #[tokio::test]
    async fn refresh_rotates_token() {
        let state = get_test_state();
        let user = insert_test_user(&state, "hunter2");
        let old_token = encode_back_dated_token(&state);
        {
            let connection = state.db_connection.lock().unwrap();
            store_refresh_token(&old_token, user.id, &connection).unwrap();
        }

        let Json(response) = refresh_endpoint(
            State(state.clone()),
            Json(RefreshData {
                refresh_token: old_token.clone(),
            }),
        )
        .await
        .expect("Could not refresh token");

        assert_ne!(response.access_token, old_token);

        let connection = state.db_connection.lock().unwrap();
        assert_eq!(refresh_token_exists(&old_token, &connection), Ok(false));
        assert_eq!(
            refresh_token_exists(&response.access_token, &connection),
            Ok(true)
        );
    }

    #[tokio::test]
    async fn refresh_rejects_token_missing_from_ledger() {
        let state = get_test_state();
        insert_test_user(&state, "hunter2");
        // Valid signature, but never recorded in the ledger.
        let token = issue_token(TEST_EMAIL, &state.encoding_key).unwrap();

        let result = refresh_endpoint(
            State(state),
            Json(RefreshData {
                refresh_token: token,
            }),
        )
        .await;

        assert_eq!(result.unwrap_err(), Error::InvalidRefreshToken);
    }

    #[tokio::test]
    async fn refresh_rejects_garbage_token() {
        let state = get_test_state();

        let result = refresh_endpoint(
            State(state),
            Json(RefreshData {
                refresh_token: "not.a.token".to_owned(),
            }),
        )
        .await;

        assert_eq!(result.unwrap_err(), Error::InvalidRefreshToken);
    }

    #[tokio::test]
    async fn refreshed_token_cannot_be_replayed() {
        let state = get_test_state();
        let user = insert_test_user(&state, "hunter2");
        let old_token = encode_back_dated_token(&state);
        {
            let connection = state.db_connection.lock().unwrap();
            store_refresh_token(&old_token, user.id, &connection).unwrap();
        }

        refresh_endpoint(
            State(state.clone()),
            Json(RefreshData {
                refresh_token: old_token.clone(),
            }),
        )
        .await
        .expect("first refresh should succeed");

        let replay = refresh_endpoint(
            State(state),
            Json(RefreshData {
                refresh_token: old_token,
            }),
        )
        .await;

        assert_eq!(replay.unwrap_err(), Error::InvalidRefreshToken);
    }

    #[tokio::test]
    async fn me_returns_caller_email() {
        let user = CurrentUser {
            user_id: crate::user::UserID::new(1),
            email: TEST_EMAIL.to_owned(),
        };

        let Json(body) = me_endpoint(Extension(user)).await;

        assert_eq!(body["email"], TEST_EMAIL);
    }

    #[tokio::test]
    async fn log_out_invalidates_all_tokens() {
        let state = get_test_state();
        let user = insert_test_user(&state, "hunter2");
        let first_token = encode_back_dated_token(&state);
        let second_token = issue_token(TEST_EMAIL, &state.encoding_key).unwrap();
        {
            let connection = state.db_connection.lock().unwrap();
            store_refresh_token(&first_token, user.id, &connection).unwrap();
            store_refresh_token(&second_token, user.id, &connection).unwrap();
        }
        let current_user = CurrentUser {
            user_id: user.id,
            email: TEST_EMAIL.to_owned(),
        };

        let Json(body) = log_out_endpoint(State(state.clone()), Extension(current_user))
            .await
            .expect("Could not log out");

        assert_eq!(body["message"], "Logged out successfully");

        let connection = state.db_connection.lock().unwrap();
        assert_eq!(refresh_token_exists(&first_token, &connection), Ok(false));
        assert_eq!(refresh_token_exists(&second_token, &connection), Ok(false));
    }
}
