//! This file defines the `Category` type, the payload types for creating and
//! updating categories and the API routes for the category type.
//! A category is used for classifying and grouping transactions.

use std::{
    fmt::Display,
    sync::{Arc, Mutex},
};

use axum::{
    Extension, Json,
    extract::{FromRef, Path, State},
    http::StatusCode,
};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;

use crate::{AppState, Error, auth::CurrentUser, database_id::DatabaseID, user::UserID};

/// The category type used when the client does not specify one.
const DEFAULT_CATEGORY_TYPE: &str = "general";

/// The name of a category.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct CategoryName(String);

impl CategoryName {
    /// Create a category name.
    ///
    /// Leading and trailing whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// This function will return an [Error::EmptyCategoryName] if `name` is empty or whitespace.
    pub fn new(name: &str) -> Result<Self, Error> {
        let name = name.trim();

        if name.is_empty() {
            Err(Error::EmptyCategoryName)
        } else {
            Ok(Self(name.to_string()))
        }
    }

    /// Create a category name without validation.
    ///
    /// The caller should ensure that the string is not empty.
    ///
    /// This function has `_unchecked` in the name but is not `unsafe`, because if the non-empty invariant is violated it will cause incorrect behaviour but not affect memory safety.
    pub fn new_unchecked(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl AsRef<str> for CategoryName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for CategoryName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A category for expenses and income, e.g., 'Groceries', 'Eating Out', 'Wages'.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// The id of the category.
    pub id: DatabaseID,

    /// The id of the user that owns the category.
    pub user_id: UserID,

    /// The name of the category.
    pub name: CategoryName,

    /// A free-form grouping label such as "income" or "expense".
    #[serde(rename = "type")]
    pub category_type: String,

    /// When the category was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// The data for creating a category.
///
/// The owner and timestamps are always set server-side: this type has no
/// `id`, `user_id` or `created_at` fields, so values for them in a request
/// body are ignored during deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCategory {
    /// The name of the new category.
    pub name: String,

    /// A free-form grouping label. Defaults to "general" when omitted.
    #[serde(rename = "type")]
    pub category_type: Option<String>,
}

/// The data for updating a category.
///
/// Only the fields present in the request body are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCategory {
    /// The new name for the category.
    pub name: Option<String>,

    /// The new grouping label for the category.
    #[serde(rename = "type")]
    pub category_type: Option<String>,
}

/// The state needed for the category endpoints.
#[derive(Debug, Clone)]
pub struct CategoryState {
    /// The connection to the application database.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CategoryState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler for creating a new category.
///
/// The created category is owned by the authenticated user regardless of the
/// request body contents.
pub async fn create_category_endpoint(
    State(state): State<CategoryState>,
    Extension(user): Extension<CurrentUser>,
    Json(new_category): Json<NewCategory>,
) -> Result<(StatusCode, Json<Category>), Error> {
    let name = CategoryName::new(&new_category.name)?;
    let category_type = new_category
        .category_type
        .unwrap_or_else(|| DEFAULT_CATEGORY_TYPE.to_owned());

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let category = create_category(name, &category_type, user.user_id, &connection)?;

    Ok((StatusCode::CREATED, Json(category)))
}

/// A route handler for listing the authenticated user's categories.
pub async fn get_categories_endpoint(
    State(state): State<CategoryState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<Category>>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let categories = get_categories(user.user_id, &connection)?;

    Ok(Json(categories))
}

/// A route handler for fetching a single category by its id.
pub async fn get_category_endpoint(
    Path(category_id): Path<DatabaseID>,
    State(state): State<CategoryState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Category>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let category = get_category(category_id, user.user_id, &connection)?;

    Ok(Json(category))
}

/// A route handler for updating a category.
///
/// Only the fields present in the request body are changed. The category's
/// id, owner and creation timestamp never change.
pub async fn update_category_endpoint(
    Path(category_id): Path<DatabaseID>,
    State(state): State<CategoryState>,
    Extension(user): Extension<CurrentUser>,
    Json(changes): Json<UpdateCategory>,
) -> Result<Json<Category>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let category = update_category(category_id, user.user_id, changes, &connection)?;

    Ok(Json(category))
}

/// A route handler for deleting a category.
///
/// Transactions that referenced the category keep existing with their
/// category cleared.
pub async fn delete_category_endpoint(
    Path(category_id): Path<DatabaseID>,
    State(state): State<CategoryState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<serde_json::Value>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    delete_category(category_id, user.user_id, &connection)?;

    Ok(Json(json!({ "message": "Category deleted successfully" })))
}

/// Create a category in the database.
///
/// # Errors
/// This function will return an error if `user_id` does not refer to a valid
/// user or if there is an SQL error.
pub fn create_category(
    name: CategoryName,
    category_type: &str,
    user_id: UserID,
    connection: &Connection,
) -> Result<Category, Error> {
    let created_at = OffsetDateTime::now_utc();

    connection.execute(
        "INSERT INTO category (user_id, name, type, created_at) VALUES (?1, ?2, ?3, ?4);",
        (user_id.as_i64(), name.as_ref(), category_type, &created_at),
    )?;

    let id = connection.last_insert_rowid();

    Ok(Category {
        id,
        user_id,
        name,
        category_type: category_type.to_owned(),
        created_at,
    })
}

/// Retrieve the category with `category_id` that is owned by `user_id`.
///
/// # Errors
/// This function will return an [Error::CategoryNotFound] if the category
/// does not exist or is owned by another user, or an error if there is an
/// SQL error.
pub fn get_category(
    category_id: DatabaseID,
    user_id: UserID,
    connection: &Connection,
) -> Result<Category, Error> {
    connection
        .prepare(
            "SELECT id, user_id, name, type, created_at FROM category
                WHERE id = :id AND user_id = :user_id;",
        )?
        .query_row(
            &[(":id", &category_id), (":user_id", &user_id.as_i64())],
            map_category_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::CategoryNotFound,
            error => error.into(),
        })
}

/// Retrieve all of the categories owned by `user_id`.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_categories(user_id: UserID, connection: &Connection) -> Result<Vec<Category>, Error> {
    connection
        .prepare(
            "SELECT id, user_id, name, type, created_at FROM category
                WHERE user_id = :user_id ORDER BY id ASC;",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], map_category_row)?
        .map(|maybe_category| maybe_category.map_err(|error| error.into()))
        .collect()
}

/// Check whether a category with `category_id` exists, regardless of owner.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn category_exists(category_id: DatabaseID, connection: &Connection) -> Result<bool, Error> {
    connection
        .prepare("SELECT EXISTS (SELECT 1 FROM category WHERE id = :id);")?
        .query_row(&[(":id", &category_id)], |row| row.get(0))
        .map_err(|error| error.into())
}

/// Update the category with `category_id` owned by `user_id`, applying only
/// the fields present in `changes`.
///
/// # Errors
/// This function will return an error if:
/// - the category does not exist or is owned by another user,
/// - the new name is empty,
/// - or there is an SQL error.
pub fn update_category(
    category_id: DatabaseID,
    user_id: UserID,
    changes: UpdateCategory,
    connection: &Connection,
) -> Result<Category, Error> {
    let existing = get_category(category_id, user_id, connection)?;

    let name = match changes.name {
        Some(raw_name) => CategoryName::new(&raw_name)?,
        None => existing.name,
    };
    let category_type = changes.category_type.unwrap_or(existing.category_type);

    connection.execute(
        "UPDATE category SET name = ?1, type = ?2 WHERE id = ?3 AND user_id = ?4;",
        (
            name.as_ref(),
            &category_type,
            category_id,
            user_id.as_i64(),
        ),
    )?;

    Ok(Category {
        id: existing.id,
        user_id: existing.user_id,
        name,
        category_type,
        created_at: existing.created_at,
    })
}

/// Delete the category with `category_id` owned by `user_id`.
///
/// # Errors
/// This function will return an [Error::CategoryNotFound] if the category
/// does not exist or is owned by another user, or an error if there is an
/// SQL error.
pub fn delete_category(
    category_id: DatabaseID,
    user_id: UserID,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM category WHERE id = ?1 AND user_id = ?2;",
        (category_id, user_id.as_i64()),
    )?;

    if rows_affected == 0 {
        return Err(Error::CategoryNotFound);
    }

    Ok(())
}

/// Create the category table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_category_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS category (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            type TEXT NOT NULL DEFAULT 'general',
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES user(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_category_user_id ON category(user_id);",
    )?;

    Ok(())
}

fn map_category_row(row: &Row) -> Result<Category, rusqlite::Error> {
    let raw_name: String = row.get("name")?;

    Ok(Category {
        id: row.get("id")?,
        user_id: UserID::new(row.get("user_id")?),
        name: CategoryName::new_unchecked(&raw_name),
        category_type: row.get("type")?,
        created_at: row.get("created_at")?,
    })
}
