//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/api/v1/categories/{category_id}',
//! use [format_endpoint].

/// The unauthenticated route for checking that the server is up.
pub const HEALTH: &str = "/health";
/// The route for registering a new user account.
pub const REGISTER: &str = "/api/v1/auth/register";
/// The route for logging in a user.
pub const LOG_IN: &str = "/api/v1/auth/login";
/// The route for exchanging a refresh token for a fresh access token.
pub const REFRESH: &str = "/api/v1/auth/refresh";
/// The route for fetching the identity of the authenticated caller.
pub const ME: &str = "/api/v1/auth/me";
/// The route for revoking the caller's refresh tokens.
pub const LOG_OUT: &str = "/api/v1/auth/logout";
/// The route to list and create categories.
pub const CATEGORIES: &str = "/api/v1/categories";
/// The route to get, update, or delete a single category.
pub const CATEGORY: &str = "/api/v1/categories/{category_id}";
/// The route to list and create transactions.
pub const TRANSACTIONS: &str = "/api/v1/transactions";
/// The route to get, update, or delete a single transaction.
pub const TRANSACTION: &str = "/api/v1/transactions/{transaction_id}";
/// The route to parse an uploaded receipt file.
pub const PARSE_RECEIPT: &str = "/api/v1/receipts/parse-file";
/// The route for the zero-filled daily income/expense series.
pub const DAILY_SERIES: &str = "/api/v1/reports/series/daily";
/// The route for the zero-filled monthly income/expense series.
pub const MONTHLY_SERIES: &str = "/api/v1/reports/series/monthly";
/// The route for the per-category breakdown of a calendar month.
pub const CATEGORY_PIE: &str = "/api/v1/reports/pie/categories";
/// The route for the current-vs-previous month summary cards.
pub const SUMMARY_CARDS: &str = "/api/v1/reports/summary/cards";
/// The route for the month-over-month comparison series.
pub const MOM_COMPARE: &str = "/api/v1/reports/compare/mom";
/// The route for the next-month income/expense forecast.
pub const FORECAST: &str = "/api/v1/reports/forecast/next-month";
/// The legacy route for income/expense totals over a date range.
pub const SUMMARY: &str = "/api/v1/reports/summary";
/// The legacy route for per-category totals over a date range.
pub const BY_CATEGORY: &str = "/api/v1/reports/by-category";
/// The legacy route for the daily series over a date range.
pub const BY_DAY: &str = "/api/v1/reports/by-day";
/// The legacy route for the monthly cashflow series.
pub const CASHFLOW: &str = "/api/v1/reports/cashflow";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/users/{user_id}', '{user_id}' is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let mut param_start = None;
    let mut param_end = None;

    for (i, c) in endpoint_path.chars().enumerate() {
        if c == '{' {
            param_start = Some(i);
        } else if param_start.is_some() && c == '}' {
            param_end = Some(i + 1);
            break;
        }
    }

    let param_start = match param_start {
        Some(start) => start,
        None => return endpoint_path.to_string(),
    };

    let param_end = param_end.unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}
