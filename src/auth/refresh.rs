//! The persisted refresh-token ledger.
//!
//! A token can only be exchanged for a fresh one while its digest is present
//! in the ledger. Logging out deletes every ledger row for the user, which
//! invalidates all of their outstanding tokens for refresh purposes.
//!
//! Tokens are stored as SHA-256 digests so that a leaked database does not
//! leak usable tokens.

use rusqlite::Connection;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::{Error, user::UserID};

/// The hex digest of a token, as stored in the ledger.
pub fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Record `token` in the ledger for `user_id`.
///
/// Recording the same token twice is a no-op, so a token issued twice within
/// the same second maps onto a single ledger row.
///
/// # Errors
/// This function will return an error if `user_id` does not refer to a valid
/// user or if there is an SQL error.
pub fn store_refresh_token(
    token: &str,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    connection.execute(
        "INSERT OR IGNORE INTO refresh_token (user_id, token_digest, created_at)
            VALUES (?1, ?2, ?3)",
        (
            user_id.as_i64(),
            token_digest(token),
            OffsetDateTime::now_utc(),
        ),
    )?;

    Ok(())
}

/// Check whether `token` is present in the ledger.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn refresh_token_exists(token: &str, connection: &Connection) -> Result<bool, Error> {
    connection
        .prepare("SELECT EXISTS (SELECT 1 FROM refresh_token WHERE token_digest = :digest)")?
        .query_row(&[(":digest", &token_digest(token))], |row| row.get(0))
        .map_err(|error| error.into())
}

/// Remove `token` from the ledger.
///
/// Removing a token that is not in the ledger is a no-op.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn delete_refresh_token(token: &str, connection: &Connection) -> Result<(), Error> {
    connection.execute(
        "DELETE FROM refresh_token WHERE token_digest = ?1",
        (token_digest(token),),
    )?;

    Ok(())
}

/// Remove every ledger row belonging to `user_id`.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn delete_user_refresh_tokens(user_id: UserID, connection: &Connection) -> Result<(), Error> {
    connection.execute(
        "DELETE FROM refresh_token WHERE user_id = ?1",
        (user_id.as_i64(),),
    )?;

    Ok(())
}

/// Create the refresh token table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_refresh_token_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS refresh_token (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            token_digest TEXT UNIQUE NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_refresh_token_user_id ON refresh_token(user_id);",
    )?;

    Ok(())
}

#[cfg(test)]
mod refresh_token_tests {
    use std::str::FromStr;

    use email_address::EmailAddress;
    use rusqlite::Connection;

    use crate::{
        PasswordHash,
        db::initialize,
        user::{User, create_user},
    };

    use super::{
        delete_refresh_token, delete_user_refresh_tokens, refresh_token_exists,
        store_refresh_token, token_digest,
    };

    fn get_test_connection_and_user() -> (Connection, User) {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).expect("Could not initialize database");

        let user = create_user(
            EmailAddress::from_str("foo@bar.baz").unwrap(),
            PasswordHash::new_unchecked("hunter2"),
            None,
            &connection,
        )
        .expect("Could not create test user");

        (connection, user)
    }

    #[test]
    fn digest_is_sha256_hex() {
        let digest = token_digest("abc");

        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn stored_token_exists() {
        let (connection, user) = get_test_connection_and_user();

        store_refresh_token("some.token.value", user.id, &connection)
            .expect("Could not store token");

        assert_eq!(
            refresh_token_exists("some.token.value", &connection),
            Ok(true)
        );
        assert_eq!(
            refresh_token_exists("some.other.token", &connection),
            Ok(false)
        );
    }

    #[test]
    fn storing_same_token_twice_is_idempotent() {
        let (connection, user) = get_test_connection_and_user();

        store_refresh_token("some.token.value", user.id, &connection).unwrap();
        let result = store_refresh_token("some.token.value", user.id, &connection);

        assert_eq!(result, Ok(()));

        let count: i64 = connection
            .query_row("SELECT COUNT(id) FROM refresh_token", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn deleted_token_no_longer_exists() {
        let (connection, user) = get_test_connection_and_user();
        store_refresh_token("some.token.value", user.id, &connection).unwrap();

        delete_refresh_token("some.token.value", &connection).expect("Could not delete token");

        assert_eq!(
            refresh_token_exists("some.token.value", &connection),
            Ok(false)
        );
    }

    #[test]
    fn delete_user_refresh_tokens_only_clears_own_rows() {
        let (connection, user) = get_test_connection_and_user();
        let other_user = create_user(
            EmailAddress::from_str("bar@baz.qux").unwrap(),
            PasswordHash::new_unchecked("hunter3"),
            None,
            &connection,
        )
        .unwrap();
        store_refresh_token("first.token", user.id, &connection).unwrap();
        store_refresh_token("second.token", user.id, &connection).unwrap();
        store_refresh_token("their.token", other_user.id, &connection).unwrap();

        delete_user_refresh_tokens(user.id, &connection).expect("Could not delete tokens");

        assert_eq!(refresh_token_exists("first.token", &connection), Ok(false));
        assert_eq!(refresh_token_exists("second.token", &connection), Ok(false));
        assert_eq!(refresh_token_exists("their.token", &connection), Ok(true));
    }
}
