//! Transaction management for the money tracking service.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and `TransactionBuilder` for creating transactions
//! - Database functions for storing, querying, and managing transactions
//! - Route handlers for the transaction REST endpoints
//!
//! All queries are scoped to the owning user: a transaction belonging to
//! another user is indistinguishable from one that does not exist.

use std::sync::{Arc, Mutex};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, Query, State},
    http::StatusCode,
};
use rusqlite::{Connection, Row, params_from_iter, types::Value};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::{Date, OffsetDateTime};

use crate::{
    AppState, Error,
    auth::CurrentUser,
    category::category_exists,
    database_id::DatabaseID,
    pagination::{PageQuery, Pagination},
    user::UserID,
};

/// The currency code used when the client does not specify one.
const DEFAULT_CURRENCY: &str = "INR";

// ============================================================================
// MODELS
// ============================================================================

/// An expense or income, i.e. an event where money was either spent or earned.
///
/// To create a new `Transaction`, use [Transaction::build].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: DatabaseID,

    /// The ID of the user that owns the transaction.
    pub user_id: UserID,

    /// The ID of the category the transaction belongs to.
    ///
    /// Becomes null when the category is deleted.
    pub category_id: Option<DatabaseID>,

    /// The ID of the receipt the transaction was created from, if any.
    pub receipt_id: Option<DatabaseID>,

    /// Whether money was earned ("income") or spent ("expense").
    ///
    /// Stored as free-form text; reports match it case-insensitively.
    #[serde(rename = "type")]
    pub transaction_type: String,

    /// The amount of money spent or earned in this transaction.
    pub amount: f64,

    /// The ISO 4217 currency code for `amount`.
    pub currency: String,

    /// When the transaction happened.
    pub date: Date,

    /// Free-form notes about the transaction.
    pub notes: Option<String>,

    /// The merchant or counterparty of the transaction.
    pub merchant: String,

    /// When the transaction was first recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the transaction was last modified.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Transaction {
    /// Create a new transaction.
    ///
    /// Shortcut for [TransactionBuilder] for discoverability.
    pub fn build(
        user_id: UserID,
        category_id: DatabaseID,
        transaction_type: &str,
        amount: f64,
        date: Date,
        merchant: &str,
    ) -> TransactionBuilder {
        TransactionBuilder {
            user_id,
            category_id,
            receipt_id: None,
            transaction_type: transaction_type.to_owned(),
            amount,
            currency: DEFAULT_CURRENCY.to_owned(),
            date,
            notes: None,
            merchant: merchant.to_owned(),
        }
    }
}

/// A builder for creating [Transaction] instances.
///
/// Required fields are set by [Transaction::build], optional fields by the
/// setter methods. Pass the builder to [create_transaction] to insert the
/// transaction into the database.
#[derive(Debug, PartialEq, Clone)]
pub struct TransactionBuilder {
    /// The ID of the user that will own the transaction.
    pub user_id: UserID,
    /// The ID of the category the transaction belongs to.
    pub category_id: DatabaseID,
    /// The ID of the receipt the transaction was created from, if any.
    pub receipt_id: Option<DatabaseID>,
    /// Whether money was earned ("income") or spent ("expense").
    pub transaction_type: String,
    /// The amount of money spent or earned.
    pub amount: f64,
    /// The ISO 4217 currency code for the amount. Defaults to "INR".
    pub currency: String,
    /// When the transaction happened.
    pub date: Date,
    /// Free-form notes about the transaction.
    pub notes: Option<String>,
    /// The merchant or counterparty of the transaction.
    pub merchant: String,
}

impl TransactionBuilder {
    /// Set the receipt ID for the transaction.
    pub fn receipt_id(mut self, receipt_id: Option<DatabaseID>) -> Self {
        self.receipt_id = receipt_id;
        self
    }

    /// Set the currency code for the transaction.
    pub fn currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_owned();
        self
    }

    /// Set the notes for the transaction.
    pub fn notes(mut self, notes: Option<&str>) -> Self {
        self.notes = notes.map(|notes| notes.to_owned());
        self
    }
}

/// The data for creating a transaction.
///
/// The owner and timestamps are always set server-side: this type has no
/// `id`, `user_id`, `created_at` or `updated_at` fields, so values for them
/// in a request body are ignored during deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    /// The ID of the category for the transaction. Required.
    pub category_id: Option<DatabaseID>,

    /// The ID of the receipt the transaction was created from, if any.
    pub receipt_id: Option<DatabaseID>,

    /// Whether money was earned ("income") or spent ("expense").
    #[serde(rename = "type")]
    pub transaction_type: String,

    /// The amount of money spent or earned.
    pub amount: f64,

    /// The ISO 4217 currency code for the amount. Defaults to "INR".
    pub currency: Option<String>,

    /// When the transaction happened.
    pub date: Date,

    /// Free-form notes about the transaction.
    pub notes: Option<String>,

    /// The merchant or counterparty of the transaction. Required.
    pub merchant: Option<String>,
}

/// The data for updating a transaction.
///
/// Only the fields present in the request body are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTransaction {
    /// The new category for the transaction.
    pub category_id: Option<DatabaseID>,

    /// The new receipt reference for the transaction.
    pub receipt_id: Option<DatabaseID>,

    /// The new type for the transaction.
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,

    /// The new amount for the transaction.
    pub amount: Option<f64>,

    /// The new currency code for the transaction.
    pub currency: Option<String>,

    /// The new date for the transaction.
    pub date: Option<Date>,

    /// The new notes for the transaction.
    pub notes: Option<String>,

    /// The new merchant for the transaction.
    pub merchant: Option<String>,
}

/// The filters accepted by the transaction list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    /// Only include transactions on or after this date.
    pub start_date: Option<Date>,

    /// Only include transactions on or before this date.
    pub end_date: Option<Date>,

    /// Only include transactions whose type matches exactly.
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,

    /// Only include transactions with this category.
    pub category_id: Option<DatabaseID>,
}

/// One page of transactions along with the paging details.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionPage {
    /// The transactions on this page, most recent first.
    pub data: Vec<Transaction>,

    /// The paging details for the full result set.
    pub pagination: Pagination,
}

/// The state needed for the transaction endpoints.
#[derive(Debug, Clone)]
pub struct TransactionState {
    /// The connection to the application database.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for TransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// A route handler for creating a new transaction.
///
/// The created transaction is owned by the authenticated user regardless of
/// the request body contents.
pub async fn create_transaction_endpoint(
    State(state): State<TransactionState>,
    Extension(user): Extension<CurrentUser>,
    Json(new_transaction): Json<NewTransaction>,
) -> Result<(StatusCode, Json<Transaction>), Error> {
    let Some(category_id) = new_transaction.category_id else {
        return Err(Error::CategoryRequired);
    };
    let merchant = new_transaction
        .merchant
        .filter(|merchant| !merchant.trim().is_empty())
        .ok_or(Error::MerchantRequired)?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    if !category_exists(category_id, &connection)? {
        return Err(Error::InvalidCategoryId);
    }

    let builder = Transaction::build(
        user.user_id,
        category_id,
        &new_transaction.transaction_type,
        new_transaction.amount,
        new_transaction.date,
        &merchant,
    )
    .receipt_id(new_transaction.receipt_id)
    .currency(
        new_transaction
            .currency
            .as_deref()
            .unwrap_or(DEFAULT_CURRENCY),
    )
    .notes(new_transaction.notes.as_deref());

    let transaction = create_transaction(builder, &connection)?;

    Ok((StatusCode::CREATED, Json(transaction)))
}

/// A route handler for listing the authenticated user's transactions.
///
/// Results are filtered by the query parameters, ordered by date descending
/// (ties broken by ID descending) and returned one page at a time.
pub async fn get_transactions_endpoint(
    State(state): State<TransactionState>,
    Extension(user): Extension<CurrentUser>,
    Query(filter): Query<TransactionFilter>,
    Query(page_query): Query<PageQuery>,
) -> Result<Json<TransactionPage>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let total_count = count_transactions(user.user_id, &filter, &connection)?;
    let data = get_transactions_page(
        user.user_id,
        &filter,
        page_query.per_page(),
        page_query.offset(),
        &connection,
    )?;

    Ok(Json(TransactionPage {
        data,
        pagination: Pagination::new(total_count, &page_query),
    }))
}

/// A route handler for fetching a single transaction by its id.
pub async fn get_transaction_endpoint(
    Path(transaction_id): Path<DatabaseID>,
    State(state): State<TransactionState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Transaction>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let transaction = get_transaction(transaction_id, user.user_id, &connection)?;

    Ok(Json(transaction))
}

/// A route handler for updating a transaction.
///
/// Only the fields present in the request body are changed. The
/// transaction's id, owner and creation timestamp never change.
pub async fn update_transaction_endpoint(
    Path(transaction_id): Path<DatabaseID>,
    State(state): State<TransactionState>,
    Extension(user): Extension<CurrentUser>,
    Json(changes): Json<UpdateTransaction>,
) -> Result<Json<Transaction>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let transaction = update_transaction(transaction_id, user.user_id, changes, &connection)?;

    Ok(Json(transaction))
}

/// A route handler for deleting a transaction.
pub async fn delete_transaction_endpoint(
    Path(transaction_id): Path<DatabaseID>,
    State(state): State<TransactionState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    delete_transaction(transaction_id, user.user_id, &connection)?;

    Ok(Json(json!({ "message": "Transaction deleted successfully" })))
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create a new transaction in the database from a builder.
///
/// # Errors
/// This function will return a:
/// - [Error::InvalidForeignKey] if the builder references a category,
///   receipt, or user that does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn create_transaction(
    builder: TransactionBuilder,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let now = OffsetDateTime::now_utc();

    let transaction = connection
        .prepare(
            "INSERT INTO \"transaction\"
                (user_id, category_id, receipt_id, type, amount, currency, date, notes, merchant, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             RETURNING id, user_id, category_id, receipt_id, type, amount, currency, date, notes, merchant, created_at, updated_at",
        )?
        .query_row(
            (
                builder.user_id.as_i64(),
                builder.category_id,
                builder.receipt_id,
                builder.transaction_type,
                builder.amount,
                builder.currency,
                builder.date,
                builder.notes,
                builder.merchant,
                now,
                now,
            ),
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Retrieve the transaction with `transaction_id` that is owned by `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::TransactionNotFound] if the transaction does not exist or is
///   owned by another user,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_transaction(
    transaction_id: DatabaseID,
    user_id: UserID,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(
            "SELECT id, user_id, category_id, receipt_id, type, amount, currency, date, notes, merchant, created_at, updated_at
                FROM \"transaction\" WHERE id = :id AND user_id = :user_id",
        )?
        .query_row(
            &[(":id", &transaction_id), (":user_id", &user_id.as_i64())],
            map_transaction_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::TransactionNotFound,
            error => error.into(),
        })
}

/// Count the transactions owned by `user_id` that match `filter`.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn count_transactions(
    user_id: UserID,
    filter: &TransactionFilter,
    connection: &Connection,
) -> Result<i64, Error> {
    let (where_clause, params) = build_filter_clause(user_id, filter);
    let sql = format!("SELECT COUNT(id) FROM \"transaction\" WHERE {where_clause}");

    connection
        .query_row(&sql, params_from_iter(params), |row| row.get(0))
        .map_err(|error| error.into())
}

/// Retrieve one page of the transactions owned by `user_id` that match
/// `filter`.
///
/// Results are ordered by date descending with ties broken by ID descending
/// so that the order stays stable across pages.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_transactions_page(
    user_id: UserID,
    filter: &TransactionFilter,
    limit: i64,
    offset: i64,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    let (where_clause, mut params) = build_filter_clause(user_id, filter);
    let sql = format!(
        "SELECT id, user_id, category_id, receipt_id, type, amount, currency, date, notes, merchant, created_at, updated_at
            FROM \"transaction\" WHERE {where_clause}
            ORDER BY date DESC, id DESC LIMIT ? OFFSET ?"
    );
    params.push(Value::from(limit));
    params.push(Value::from(offset));

    connection
        .prepare(&sql)?
        .query_map(params_from_iter(params), map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
        .collect()
}

/// Build the WHERE clause and parameter list shared by the count and page
/// queries.
fn build_filter_clause(user_id: UserID, filter: &TransactionFilter) -> (String, Vec<Value>) {
    let mut clause = String::from("user_id = ?");
    let mut params = vec![Value::from(user_id.as_i64())];

    if let Some(start_date) = filter.start_date {
        clause.push_str(" AND date >= ?");
        params.push(Value::from(start_date.to_string()));
    }

    if let Some(end_date) = filter.end_date {
        clause.push_str(" AND date <= ?");
        params.push(Value::from(end_date.to_string()));
    }

    if let Some(transaction_type) = &filter.transaction_type {
        clause.push_str(" AND type = ?");
        params.push(Value::from(transaction_type.clone()));
    }

    if let Some(category_id) = filter.category_id {
        clause.push_str(" AND category_id = ?");
        params.push(Value::from(category_id));
    }

    (clause, params)
}

/// Update the transaction with `transaction_id` owned by `user_id`, applying
/// only the fields present in `changes` and refreshing the update timestamp.
///
/// # Errors
/// This function will return a:
/// - [Error::TransactionNotFound] if the transaction does not exist or is
///   owned by another user,
/// - [Error::MerchantRequired] if the new merchant is empty,
/// - [Error::InvalidCategoryId] if the new category does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_transaction(
    transaction_id: DatabaseID,
    user_id: UserID,
    changes: UpdateTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let existing = get_transaction(transaction_id, user_id, connection)?;

    let merchant = match changes.merchant {
        Some(merchant) if merchant.trim().is_empty() => return Err(Error::MerchantRequired),
        Some(merchant) => merchant,
        None => existing.merchant,
    };
    let category_id = match changes.category_id {
        Some(category_id) => {
            if !category_exists(category_id, connection)? {
                return Err(Error::InvalidCategoryId);
            }
            Some(category_id)
        }
        None => existing.category_id,
    };

    let transaction = Transaction {
        id: existing.id,
        user_id: existing.user_id,
        category_id,
        receipt_id: changes.receipt_id.or(existing.receipt_id),
        transaction_type: changes.transaction_type.unwrap_or(existing.transaction_type),
        amount: changes.amount.unwrap_or(existing.amount),
        currency: changes.currency.unwrap_or(existing.currency),
        date: changes.date.unwrap_or(existing.date),
        notes: changes.notes.or(existing.notes),
        merchant,
        created_at: existing.created_at,
        updated_at: OffsetDateTime::now_utc(),
    };

    connection.execute(
        "UPDATE \"transaction\"
            SET category_id = ?1, receipt_id = ?2, type = ?3, amount = ?4, currency = ?5,
                date = ?6, notes = ?7, merchant = ?8, updated_at = ?9
            WHERE id = ?10 AND user_id = ?11",
        (
            transaction.category_id,
            transaction.receipt_id,
            &transaction.transaction_type,
            transaction.amount,
            &transaction.currency,
            transaction.date,
            &transaction.notes,
            &transaction.merchant,
            transaction.updated_at,
            transaction.id,
            user_id.as_i64(),
        ),
    )?;

    Ok(transaction)
}

/// Delete the transaction with `transaction_id` owned by `user_id`.
///
/// # Errors
/// This function will return a [Error::TransactionNotFound] if the
/// transaction does not exist or is owned by another user, or an error if
/// there is an SQL error.
pub fn delete_transaction(
    transaction_id: DatabaseID,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM \"transaction\" WHERE id = ?1 AND user_id = ?2",
        (transaction_id, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::TransactionNotFound);
    }

    Ok(())
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            category_id INTEGER,
            receipt_id INTEGER,
            type TEXT NOT NULL,
            amount REAL NOT NULL,
            currency TEXT NOT NULL,
            date TEXT NOT NULL,
            notes TEXT,
            merchant TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE,
            FOREIGN KEY(category_id) REFERENCES category(id) ON UPDATE CASCADE ON DELETE SET NULL,
            FOREIGN KEY(receipt_id) REFERENCES receipt(id) ON UPDATE CASCADE ON DELETE SET NULL
        );

        CREATE INDEX IF NOT EXISTS idx_transaction_user_date ON \"transaction\"(user_id, date);",
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get("id")?,
        user_id: UserID::new(row.get("user_id")?),
        category_id: row.get("category_id")?,
        receipt_id: row.get("receipt_id")?,
        transaction_type: row.get("type")?,
        amount: row.get("amount")?,
        currency: row.get("currency")?,
        date: row.get("date")?,
        notes: row.get("notes")?,
        merchant: row.get("merchant")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

// ============================================================================
// TESTS
// ============================================================================
