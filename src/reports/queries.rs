//! SQL aggregation over the transaction table.
//!
//! All sums treat the transaction type case-insensitively so that rows
//! recorded as "Expense" or "EXPENSE" land in the same bucket as
//! "expense".

use rusqlite::{Connection, OptionalExtension, named_params, params_from_iter, types::Value};
use time::Date;

use crate::{Error, database_id::DatabaseID, user::UserID};

/// Income and expense totals for one day or month bucket.
#[derive(Debug, PartialEq)]
pub(super) struct BucketTotals {
    /// The bucket label: a `YYYY-MM-DD` day or a `YYYY-MM` month.
    pub(super) bucket: String,
    pub(super) income: f64,
    pub(super) expense: f64,
}

/// The total amount for one category, joined to the category's name.
#[derive(Debug, PartialEq)]
pub(super) struct CategoryTotal {
    pub(super) category_id: DatabaseID,
    pub(super) category_name: String,
    pub(super) total: f64,
}

/// Sum income and expense per day over an inclusive date range, scoped to
/// `user_id`. Days without transactions produce no row.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub(super) fn sum_by_day(
    user_id: UserID,
    start_date: Date,
    end_date: Date,
    connection: &Connection,
) -> Result<Vec<BucketTotals>, Error> {
    connection
        .prepare(
            "SELECT date AS day,
                    SUM(CASE WHEN LOWER(type) = 'income' THEN amount ELSE 0 END) AS income,
                    SUM(CASE WHEN LOWER(type) = 'expense' THEN amount ELSE 0 END) AS expense
                FROM \"transaction\"
                WHERE user_id = :user_id AND date >= :start_date AND date <= :end_date
                GROUP BY day
                ORDER BY day",
        )?
        .query_map(
            named_params! {
                ":user_id": user_id.as_i64(),
                ":start_date": start_date,
                ":end_date": end_date,
            },
            map_bucket_row,
        )?
        .map(|maybe_row| maybe_row.map_err(|error| error.into()))
        .collect()
}

/// Sum income and expense per `YYYY-MM` month over the entire history of
/// `user_id`, in chronological order.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub(super) fn sum_by_month(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<BucketTotals>, Error> {
    connection
        .prepare(
            "SELECT strftime('%Y-%m', date) AS month,
                    SUM(CASE WHEN LOWER(type) = 'income' THEN amount ELSE 0 END) AS income,
                    SUM(CASE WHEN LOWER(type) = 'expense' THEN amount ELSE 0 END) AS expense
                FROM \"transaction\"
                WHERE user_id = :user_id
                GROUP BY month
                ORDER BY month",
        )?
        .query_map(named_params! { ":user_id": user_id.as_i64() }, |row| {
            Ok(BucketTotals {
                bucket: row.get("month")?,
                income: row.get("income")?,
                expense: row.get("expense")?,
            })
        })?
        .map(|maybe_row| maybe_row.map_err(|error| error.into()))
        .collect()
}

fn map_bucket_row(row: &rusqlite::Row) -> Result<BucketTotals, rusqlite::Error> {
    Ok(BucketTotals {
        bucket: row.get("day")?,
        income: row.get("income")?,
        expense: row.get("expense")?,
    })
}

/// Sum amounts per category for one transaction type over an optional date
/// range, joined to category names. Transactions without a category are
/// excluded by the join.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub(super) fn sum_by_category(
    user_id: UserID,
    transaction_type: &str,
    start_date: Option<Date>,
    end_date: Option<Date>,
    connection: &Connection,
) -> Result<Vec<CategoryTotal>, Error> {
    let mut sql = String::from(
        "SELECT t.category_id AS category_id, c.name AS name, SUM(t.amount) AS total
            FROM \"transaction\" t
            INNER JOIN category c ON t.category_id = c.id
            WHERE t.user_id = ? AND LOWER(t.type) = ?",
    );
    let mut params = vec![
        Value::from(user_id.as_i64()),
        Value::from(transaction_type.to_owned()),
    ];

    if let Some(start_date) = start_date {
        sql.push_str(" AND t.date >= ?");
        params.push(Value::from(start_date.to_string()));
    }

    if let Some(end_date) = end_date {
        sql.push_str(" AND t.date <= ?");
        params.push(Value::from(end_date.to_string()));
    }

    sql.push_str(" GROUP BY t.category_id, c.name ORDER BY t.category_id");

    connection
        .prepare(&sql)?
        .query_map(params_from_iter(params), |row| {
            Ok(CategoryTotal {
                category_id: row.get("category_id")?,
                category_name: row.get("name")?,
                total: row.get("total")?,
            })
        })?
        .map(|maybe_row| maybe_row.map_err(|error| error.into()))
        .collect()
}

/// Sum expense amounts per category ID over an inclusive date range,
/// without joining to names, so uncategorized spending is included as a
/// `None` key.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub(super) fn sum_expenses_by_category(
    user_id: UserID,
    start_date: Date,
    end_date: Date,
    connection: &Connection,
) -> Result<Vec<(Option<DatabaseID>, f64)>, Error> {
    connection
        .prepare(
            "SELECT category_id, SUM(amount) AS total
                FROM \"transaction\"
                WHERE user_id = :user_id AND LOWER(type) = 'expense'
                    AND date >= :start_date AND date <= :end_date
                GROUP BY category_id
                ORDER BY category_id",
        )?
        .query_map(
            named_params! {
                ":user_id": user_id.as_i64(),
                ":start_date": start_date,
                ":end_date": end_date,
            },
            |row| Ok((row.get("category_id")?, row.get("total")?)),
        )?
        .map(|maybe_row| maybe_row.map_err(|error| error.into()))
        .collect()
}

/// Total income and expense for `user_id` over an optional date range.
///
/// Returns `(income, expense)`, both `0.0` when no transactions match.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub(super) fn sum_income_and_expense(
    user_id: UserID,
    start_date: Option<Date>,
    end_date: Option<Date>,
    connection: &Connection,
) -> Result<(f64, f64), Error> {
    let mut sql = String::from(
        "SELECT SUM(CASE WHEN LOWER(type) = 'income' THEN amount ELSE 0 END) AS income,
                SUM(CASE WHEN LOWER(type) = 'expense' THEN amount ELSE 0 END) AS expense
            FROM \"transaction\"
            WHERE user_id = ?",
    );
    let mut params = vec![Value::from(user_id.as_i64())];

    if let Some(start_date) = start_date {
        sql.push_str(" AND date >= ?");
        params.push(Value::from(start_date.to_string()));
    }

    if let Some(end_date) = end_date {
        sql.push_str(" AND date <= ?");
        params.push(Value::from(end_date.to_string()));
    }

    // SUM returns NULL when no rows match the WHERE clause at all.
    let (income, expense): (Option<f64>, Option<f64>) = connection
        .query_row(&sql, params_from_iter(params), |row| {
            Ok((row.get("income")?, row.get("expense")?))
        })?;

    Ok((income.unwrap_or(0.0), expense.unwrap_or(0.0)))
}

/// Look up a category's name by ID, regardless of who owns the category.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub(super) fn get_category_name(
    category_id: DatabaseID,
    connection: &Connection,
) -> Result<Option<String>, Error> {
    let name = connection
        .query_row(
            "SELECT name FROM category WHERE id = :id",
            named_params! { ":id": category_id },
            |row| row.get(0),
        )
        .optional()?;

    Ok(name)
}

#[cfg(test)]
mod report_query_tests {
    use std::str::FromStr;

    use email_address::EmailAddress;
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        PasswordHash,
        category::{CategoryName, create_category},
        db::initialize,
        transaction::{Transaction, create_transaction},
        user::{User, create_user},
    };

    use super::{
        BucketTotals, get_category_name, sum_by_category, sum_by_day, sum_by_month,
        sum_expenses_by_category, sum_income_and_expense,
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

    /// Seed a groceries category plus a mix of income and expenses across
    /// January and February 2024. Returns the groceries category ID.
    fn seed_transactions(connection: &Connection, user: &User) -> i64 {
        let groceries = create_category(
            CategoryName::new_unchecked("Groceries"),
            "expense",
            user.id,
            connection,
        )
        .unwrap();

        let rows = [
            ("income", 1000.0, date!(2024 - 01 - 05)),
            ("Income", 500.0, date!(2024 - 01 - 05)),
            ("expense", 120.0, date!(2024 - 01 - 05)),
            ("EXPENSE", 80.0, date!(2024 - 01 - 20)),
            ("income", 2000.0, date!(2024 - 02 - 10)),
            ("expense", 300.0, date!(2024 - 02 - 11)),
        ];

        for (transaction_type, amount, date) in rows {
            create_transaction(
                Transaction::build(user.id, groceries.id, transaction_type, amount, date, "Shop"),
                connection,
            )
            .unwrap();
        }

        groceries.id
    }

    #[test]
    fn sum_by_day_groups_types_case_insensitively() {
        let (connection, user) = get_test_connection_and_user();
        seed_transactions(&connection, &user);

        let rows = sum_by_day(
            user.id,
            date!(2024 - 01 - 01),
            date!(2024 - 01 - 31),
            &connection,
        )
        .expect("Could not sum by day");

        assert_eq!(
            rows,
            vec![
                BucketTotals {
                    bucket: "2024-01-05".to_owned(),
                    income: 1500.0,
                    expense: 120.0,
                },
                BucketTotals {
                    bucket: "2024-01-20".to_owned(),
                    income: 0.0,
                    expense: 80.0,
                },
            ]
        );
    }

    #[test]
    fn sum_by_day_excludes_dates_outside_the_range() {
        let (connection, user) = get_test_connection_and_user();
        seed_transactions(&connection, &user);

        let rows = sum_by_day(
            user.id,
            date!(2024 - 02 - 11),
            date!(2024 - 02 - 11),
            &connection,
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bucket, "2024-02-11");
        assert_eq!(rows[0].expense, 300.0);
    }

    #[test]
    fn sum_by_day_is_scoped_to_the_user() {
        let (connection, user) = get_test_connection_and_user();
        seed_transactions(&connection, &user);
        let other_user = create_user(
            EmailAddress::from_str("bar@baz.qux").unwrap(),
            PasswordHash::new_unchecked("hunter3"),
            None,
            &connection,
        )
        .unwrap();

        let rows = sum_by_day(
            other_user.id,
            date!(2024 - 01 - 01),
            date!(2024 - 12 - 31),
            &connection,
        )
        .unwrap();

        assert!(rows.is_empty(), "want no rows, got {rows:?}");
    }

    #[test]
    fn sum_by_month_buckets_by_month_key() {
        let (connection, user) = get_test_connection_and_user();
        seed_transactions(&connection, &user);

        let rows = sum_by_month(user.id, &connection).expect("Could not sum by month");

        assert_eq!(
            rows,
            vec![
                BucketTotals {
                    bucket: "2024-01".to_owned(),
                    income: 1500.0,
                    expense: 200.0,
                },
                BucketTotals {
                    bucket: "2024-02".to_owned(),
                    income: 2000.0,
                    expense: 300.0,
                },
            ]
        );
    }

    #[test]
    fn sum_by_category_joins_names_and_skips_uncategorized() {
        let (connection, user) = get_test_connection_and_user();
        let groceries_id = seed_transactions(&connection, &user);
        let rent = create_category(
            CategoryName::new_unchecked("Rent"),
            "expense",
            user.id,
            &connection,
        )
        .unwrap();
        create_transaction(
            Transaction::build(
                user.id,
                rent.id,
                "expense",
                900.0,
                date!(2024 - 01 - 01),
                "Landlord",
            ),
            &connection,
        )
        .unwrap();
        // Orphan one transaction so its category becomes NULL.
        let orphan = create_transaction(
            Transaction::build(
                user.id,
                rent.id,
                "expense",
                55.0,
                date!(2024 - 01 - 02),
                "Cash",
            ),
            &connection,
        )
        .unwrap();
        connection
            .execute(
                "UPDATE \"transaction\" SET category_id = NULL WHERE id = ?1",
                [orphan.id],
            )
            .unwrap();

        let rows = sum_by_category(user.id, "expense", None, None, &connection)
            .expect("Could not sum by category");

        let names: Vec<&str> = rows.iter().map(|row| row.category_name.as_str()).collect();
        assert_eq!(names, vec!["Groceries", "Rent"]);
        assert_eq!(rows[0].category_id, groceries_id);
        assert_eq!(rows[0].total, 500.0);
        assert_eq!(rows[1].total, 900.0);
    }

    #[test]
    fn sum_by_category_applies_date_bounds() {
        let (connection, user) = get_test_connection_and_user();
        seed_transactions(&connection, &user);

        let rows = sum_by_category(
            user.id,
            "expense",
            Some(date!(2024 - 02 - 01)),
            Some(date!(2024 - 02 - 29)),
            &connection,
        )
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total, 300.0);
    }

    #[test]
    fn sum_expenses_by_category_includes_uncategorized() {
        let (connection, user) = get_test_connection_and_user();
        let groceries_id = seed_transactions(&connection, &user);
        let orphan = create_transaction(
            Transaction::build(
                user.id,
                groceries_id,
                "expense",
                40.0,
                date!(2024 - 01 - 15),
                "Cash",
            ),
            &connection,
        )
        .unwrap();
        connection
            .execute(
                "UPDATE \"transaction\" SET category_id = NULL WHERE id = ?1",
                [orphan.id],
            )
            .unwrap();

        let rows = sum_expenses_by_category(
            user.id,
            date!(2024 - 01 - 01),
            date!(2024 - 01 - 31),
            &connection,
        )
        .expect("Could not sum expenses by category");

        assert_eq!(rows, vec![(None, 40.0), (Some(groceries_id), 200.0)]);
    }

    #[test]
    fn sum_income_and_expense_totals_the_whole_history() {
        let (connection, user) = get_test_connection_and_user();
        seed_transactions(&connection, &user);

        let (income, expense) = sum_income_and_expense(user.id, None, None, &connection)
            .expect("Could not sum income and expense");

        assert_eq!(income, 3500.0);
        assert_eq!(expense, 500.0);
    }

    #[test]
    fn sum_income_and_expense_is_zero_without_transactions() {
        let (connection, user) = get_test_connection_and_user();

        let (income, expense) =
            sum_income_and_expense(user.id, None, None, &connection).unwrap();

        assert_eq!((income, expense), (0.0, 0.0));
    }

    #[test]
    fn sum_income_and_expense_applies_lower_bound_only() {
        let (connection, user) = get_test_connection_and_user();
        seed_transactions(&connection, &user);

        let (income, expense) =
            sum_income_and_expense(user.id, Some(date!(2024 - 02 - 01)), None, &connection)
                .unwrap();

        assert_eq!(income, 2000.0);
        assert_eq!(expense, 300.0);
    }

    #[test]
    fn get_category_name_ignores_ownership() {
        let (connection, _user) = get_test_connection_and_user();
        let other_user = create_user(
            EmailAddress::from_str("bar@baz.qux").unwrap(),
            PasswordHash::new_unchecked("hunter3"),
            None,
            &connection,
        )
        .unwrap();
        let category = create_category(
            CategoryName::new_unchecked("Travel"),
            "expense",
            other_user.id,
            &connection,
        )
        .unwrap();

        assert_eq!(
            get_category_name(category.id, &connection),
            Ok(Some("Travel".to_owned()))
        );
    }

    #[test]
    fn get_category_name_returns_none_for_missing_category() {
        let (connection, _) = get_test_connection_and_user();

        assert_eq!(get_category_name(1337, &connection), Ok(None));
    }
}
