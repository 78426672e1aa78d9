//! Database initialization for the application.

use rusqlite::{Connection, Transaction as SqlTransaction};

use crate::{
    Error, auth::create_refresh_token_table, category::create_category_table,
    receipts::create_receipt_table, transaction::create_transaction_table,
    user::create_user_table,
};

/// Create the application's tables if they do not already exist.
///
/// Tables are created within a single exclusive transaction so that a
/// partially initialized schema is never left behind. Foreign key
/// enforcement is switched on for the connection: the schema relies on
/// `ON DELETE` actions such as clearing the category of a transaction.
///
/// # Errors
///
/// This function will return an error if a table could not be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    // SQLite ignores this pragma inside a transaction, so set it first.
    connection.pragma_update(None, "foreign_keys", true)?;

    let transaction =
        SqlTransaction::new_unchecked(connection, rusqlite::TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_category_table(&transaction)?;
    create_receipt_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_refresh_token_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
