//! The report endpoints.
//!
//! Every report is scoped to the authenticated caller and rounds money to
//! two decimal places. "Today" is the current UTC calendar date.

use std::{
    collections::HashMap,
    ops::RangeInclusive,
    sync::{Arc, Mutex},
};

use axum::{
    Extension, Json,
    extract::{FromRef, Query, State},
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Value, json};
use time::{Date, Duration, Month, OffsetDateTime};

use crate::{AppState, Error, auth::CurrentUser, user::UserID};

use super::{
    calendar::{
        date_range, end_of_month, last_n_month_keys, month_add, month_key, next_month_key,
        start_of_month,
    },
    queries::{
        BucketTotals, get_category_name, sum_by_category, sum_by_day, sum_by_month,
        sum_expenses_by_category, sum_income_and_expense,
    },
};

/// The state needed for the report endpoints.
#[derive(Debug, Clone)]
pub struct ReportState {
    /// The connection to the application database.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ReportState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

// ============================================================================
// QUERY PARAMETERS
// ============================================================================

/// The query parameters for the daily series report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DailySeriesQuery {
    /// How many trailing days to include, from 1 to 180. Defaults to 30.
    pub days: Option<i64>,
}

/// The query parameters for the reports bucketed by month.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonthsQuery {
    /// How many trailing months to include. Each report bounds and
    /// defaults this differently.
    pub months: Option<i64>,
}

/// The query parameters for the category pie report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PieQuery {
    /// The calendar year to report on. Defaults to the current year.
    pub year: Option<i32>,

    /// The calendar month to report on, from 1 to 12. Defaults to the
    /// current month.
    pub month: Option<u8>,

    /// Which transaction type to total: "income" or "expense" (the
    /// default).
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
}

/// The query parameters for the next-month forecast.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastQuery {
    /// How many whole months of history to average over, from 2 to 12.
    /// Defaults to 3. The current month is never part of the history.
    pub lookback_months: Option<i64>,
}

/// An optional inclusive date range shared by the legacy reports.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RangeQuery {
    /// The first date to include.
    pub start_date: Option<Date>,

    /// The last date to include.
    pub end_date: Option<Date>,
}

/// The query parameters for the legacy by-category report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ByCategoryQuery {
    /// The first date to include.
    pub start_date: Option<Date>,

    /// The last date to include.
    pub end_date: Option<Date>,

    /// Which transaction type to total: "income" or "expense" (the
    /// default).
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// A route handler for the daily income/expense series.
///
/// Returns one point per calendar day over the trailing `days` window,
/// zero-filled so charts get a contiguous axis.
pub async fn daily_series_endpoint(
    State(state): State<ReportState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<DailySeriesQuery>,
) -> Result<Json<Value>, Error> {
    let days = bounded(query.days, 30, 1..=180, "days")?;
    let end_date = OffsetDateTime::now_utc().date();
    let start_date = end_date - Duration::days(days - 1);

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let rows = sum_by_day(user.user_id, start_date, end_date, &connection)?;
    let series = zero_filled_daily_points(&rows, start_date, end_date);

    Ok(Json(json!({
        "range": { "start": start_date.to_string(), "end": end_date.to_string() },
        "series": series,
    })))
}

/// A route handler for the monthly income/expense series.
///
/// Buckets the trailing `months` months including the current one,
/// zero-filling months without transactions.
pub async fn monthly_series_endpoint(
    State(state): State<ReportState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<MonthsQuery>,
) -> Result<Json<Value>, Error> {
    let months = bounded(query.months, 12, 1..=36, "months")?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let series = monthly_series(user.user_id, months, &connection)?;

    Ok(Json(json!({ "series": series })))
}

/// A route handler for the category pie report.
///
/// Totals one calendar month's transactions of one type per category.
/// Transactions without a category are left out; the response `total` is
/// always the sum of the slice values.
pub async fn category_pie_endpoint(
    State(state): State<ReportState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<PieQuery>,
) -> Result<Json<Value>, Error> {
    let transaction_type = validated_type(query.transaction_type)?;
    let today = OffsetDateTime::now_utc().date();
    let year = query.year.unwrap_or_else(|| today.year());
    let month_number = query.month.unwrap_or_else(|| u8::from(today.month()));
    let month = Month::try_from(month_number)
        .map_err(|_| Error::InvalidParameter("month must be between 1 and 12".to_owned()))?;
    let month_start = Date::from_calendar_date(year, month, 1)
        .map_err(|_| Error::InvalidParameter("year is out of range".to_owned()))?;
    let month_end = end_of_month(month_start);

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let rows = sum_by_category(
        user.user_id,
        &transaction_type,
        Some(month_start),
        Some(month_end),
        &connection,
    )?;

    let slices: Vec<Value> = rows
        .iter()
        .map(|row| {
            json!({
                "category_id": row.category_id,
                "category_name": display_name(&row.category_name),
                "value": round2(row.total),
            })
        })
        .collect();
    let total: f64 = slices
        .iter()
        .filter_map(|slice| slice["value"].as_f64())
        .sum();

    Ok(Json(json!({
        "year": year,
        "month": month_number,
        "type": transaction_type,
        "total": round2(total),
        "slices": slices,
    })))
}

/// A route handler for the dashboard summary cards.
///
/// Compares the current calendar month against the previous one and
/// reports the change per measure.
pub async fn summary_cards_endpoint(
    State(state): State<ReportState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Value>, Error> {
    let today = OffsetDateTime::now_utc().date();
    let this_start = start_of_month(today);
    let this_end = end_of_month(today);
    let last_start = month_add(this_start, -1);
    let last_end = end_of_month(last_start);

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let (this_income, this_expense) =
        sum_income_and_expense(user.user_id, Some(this_start), Some(this_end), &connection)?;
    let (last_income, last_expense) =
        sum_income_and_expense(user.user_id, Some(last_start), Some(last_end), &connection)?;

    Ok(Json(json!({
        "this_month": month_card(this_start, this_income, this_expense),
        "last_month": month_card(last_start, last_income, last_expense),
        "delta": {
            "income": round2(this_income - last_income),
            "expense": round2(this_expense - last_expense),
            "net": round2((this_income - this_expense) - (last_income - last_expense)),
        },
    })))
}

/// A route handler for the month-over-month comparison.
///
/// Like the monthly series but without the net measure, for charts that
/// plot income against expense directly.
pub async fn mom_compare_endpoint(
    State(state): State<ReportState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<MonthsQuery>,
) -> Result<Json<Value>, Error> {
    let months = bounded(query.months, 6, 2..=24, "months")?;
    let today = OffsetDateTime::now_utc().date();
    let keys = last_n_month_keys(months as usize, today);

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let rows = sum_by_month(user.user_id, &connection)?;
    let totals = totals_by_bucket(&rows);

    let series: Vec<Value> = keys
        .iter()
        .map(|key| {
            let (income, expense) = totals.get(key.as_str()).copied().unwrap_or((0.0, 0.0));
            json!({
                "month": key,
                "income": round2(income),
                "expense": round2(expense),
            })
        })
        .collect();

    Ok(Json(json!({ "series": series })))
}

/// A route handler for the naive next-month forecast.
///
/// Averages income and expense over the trailing `lookback_months` whole
/// months (the current month is excluded) and projects the expense
/// forecast onto categories using each category's share of lookback
/// spending.
pub async fn forecast_endpoint(
    State(state): State<ReportState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ForecastQuery>,
) -> Result<Json<Value>, Error> {
    let lookback_months = bounded(query.lookback_months, 3, 2..=12, "lookback_months")?;
    let today = OffsetDateTime::now_utc().date();
    let current_month_start = start_of_month(today);

    let mut base_months = last_n_month_keys(lookback_months as usize + 1, today);
    base_months.pop();
    let window_start = month_add(current_month_start, -(lookback_months as i32));
    let window_end = end_of_month(month_add(current_month_start, -1));

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let rows = sum_by_month(user.user_id, &connection)?;
    let totals = totals_by_bucket(&rows);
    let income_history: Vec<f64> = base_months
        .iter()
        .map(|key| totals.get(key.as_str()).map_or(0.0, |sums| sums.0))
        .collect();
    let expense_history: Vec<f64> = base_months
        .iter()
        .map(|key| totals.get(key.as_str()).map_or(0.0, |sums| sums.1))
        .collect();

    let income_forecast =
        round2(income_history.iter().sum::<f64>() / income_history.len().max(1) as f64);
    let expense_forecast =
        round2(expense_history.iter().sum::<f64>() / expense_history.len().max(1) as f64);

    let category_rows =
        sum_expenses_by_category(user.user_id, window_start, window_end, &connection)?;
    let lookback_total: f64 = category_rows.iter().map(|(_, total)| total).sum();
    // A window without spending would otherwise divide by zero.
    let lookback_total = if lookback_total == 0.0 {
        1.0
    } else {
        lookback_total
    };

    let mut by_category = Vec::with_capacity(category_rows.len());
    for (category_id, total) in category_rows {
        let share = total / lookback_total;
        let category_name = match category_id {
            Some(id) => get_category_name(id, &connection)?
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| format!("Category {id}")),
            None => "Uncategorized".to_owned(),
        };

        by_category.push(json!({
            "category_id": category_id,
            "category_name": category_name,
            "share": round4(share),
            "projected_amount": round2(expense_forecast * share),
        }));
    }

    Ok(Json(json!({
        "lookback_months": lookback_months,
        "history": {
            "months": base_months,
            "income": income_history.iter().map(|value| round2(*value)).collect::<Vec<f64>>(),
            "expense": expense_history.iter().map(|value| round2(*value)).collect::<Vec<f64>>(),
        },
        "forecast_for": next_month_key(today),
        "forecast": {
            "income": income_forecast,
            "expense": expense_forecast,
            "net": round2(income_forecast - expense_forecast),
            "by_category": by_category,
        },
    })))
}

/// A route handler for the legacy whole-history summary.
pub async fn summary_endpoint(
    State(state): State<ReportState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Value>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let (income, expense) =
        sum_income_and_expense(user.user_id, query.start_date, query.end_date, &connection)?;

    Ok(Json(json!({
        "summary": {
            "income": round2(income),
            "expense": round2(expense),
            "net": round2(income - expense),
        },
    })))
}

/// A route handler for the legacy per-category totals.
pub async fn by_category_endpoint(
    State(state): State<ReportState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ByCategoryQuery>,
) -> Result<Json<Value>, Error> {
    let transaction_type = validated_type(query.transaction_type)?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let rows = sum_by_category(
        user.user_id,
        &transaction_type,
        query.start_date,
        query.end_date,
        &connection,
    )?;

    let by_category: Vec<Value> = rows
        .iter()
        .map(|row| {
            json!({
                "category_id": row.category_id,
                "category_name": display_name(&row.category_name),
                "total": round2(row.total),
            })
        })
        .collect();

    Ok(Json(json!({
        "type": transaction_type,
        "by_category": by_category,
    })))
}

/// A route handler for the legacy daily rollup.
///
/// A partial range falls back to the trailing 30 days, matching the
/// behavior older clients rely on.
pub async fn by_day_endpoint(
    State(state): State<ReportState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Value>, Error> {
    let (start_date, end_date) = match (query.start_date, query.end_date) {
        (Some(start_date), Some(end_date)) => (start_date, end_date),
        _ => {
            let today = OffsetDateTime::now_utc().date();
            (today - Duration::days(29), today)
        }
    };

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let rows = sum_by_day(user.user_id, start_date, end_date, &connection)?;
    let by_day = zero_filled_daily_points(&rows, start_date, end_date);

    Ok(Json(json!({
        "range": { "start": start_date.to_string(), "end": end_date.to_string() },
        "by_day": by_day,
    })))
}

/// A route handler for the legacy cashflow report.
///
/// Identical to the monthly series apart from its bounds and default.
pub async fn cashflow_endpoint(
    State(state): State<ReportState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<MonthsQuery>,
) -> Result<Json<Value>, Error> {
    let months = bounded(query.months, 6, 1..=36, "months")?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let series = monthly_series(user.user_id, months, &connection)?;

    Ok(Json(json!({ "series": series })))
}

// ============================================================================
// HELPERS
// ============================================================================

/// Apply a default and bounds-check a numeric query parameter.
fn bounded(
    value: Option<i64>,
    default: i64,
    range: RangeInclusive<i64>,
    name: &str,
) -> Result<i64, Error> {
    let value = value.unwrap_or(default);

    if !range.contains(&value) {
        return Err(Error::InvalidParameter(format!(
            "{name} must be between {} and {}",
            range.start(),
            range.end()
        )));
    }

    Ok(value)
}

/// Default and validate the report type parameter.
fn validated_type(transaction_type: Option<String>) -> Result<String, Error> {
    let transaction_type = transaction_type.unwrap_or_else(|| "expense".to_owned());

    if transaction_type != "income" && transaction_type != "expense" {
        return Err(Error::InvalidParameter(
            "type must be 'income' or 'expense'".to_owned(),
        ));
    }

    Ok(transaction_type)
}

/// Category names can be blank in rows imported from elsewhere.
fn display_name(name: &str) -> &str {
    if name.is_empty() { "Uncategorized" } else { name }
}

fn totals_by_bucket(rows: &[BucketTotals]) -> HashMap<&str, (f64, f64)> {
    rows.iter()
        .map(|row| (row.bucket.as_str(), (row.income, row.expense)))
        .collect()
}

fn zero_filled_daily_points(rows: &[BucketTotals], start_date: Date, end_date: Date) -> Vec<Value> {
    let totals = totals_by_bucket(rows);

    date_range(start_date, end_date)
        .into_iter()
        .map(|date| {
            let key = date.to_string();
            let (income, expense) = totals.get(key.as_str()).copied().unwrap_or((0.0, 0.0));
            json!({
                "date": key,
                "income": round2(income),
                "expense": round2(expense),
                "net": round2(income - expense),
            })
        })
        .collect()
}

fn monthly_series(
    user_id: UserID,
    months: i64,
    connection: &Connection,
) -> Result<Vec<Value>, Error> {
    let today = OffsetDateTime::now_utc().date();
    let keys = last_n_month_keys(months as usize, today);
    let rows = sum_by_month(user_id, connection)?;
    let totals = totals_by_bucket(&rows);

    let series = keys
        .iter()
        .map(|key| {
            let (income, expense) = totals.get(key.as_str()).copied().unwrap_or((0.0, 0.0));
            json!({
                "month": key,
                "income": round2(income),
                "expense": round2(expense),
                "net": round2(income - expense),
            })
        })
        .collect();

    Ok(series)
}

fn month_card(month_start: Date, income: f64, expense: f64) -> Value {
    json!({
        "month": month_key(month_start),
        "income": round2(income),
        "expense": round2(expense),
        "net": round2(income - expense),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

// ============================================================================
// TESTS
// ============================================================================
