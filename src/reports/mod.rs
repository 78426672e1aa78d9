//! Aggregated reports over the caller's transactions.
//!
//! Covers the chart endpoints (daily and monthly series, category pie,
//! summary cards, month-over-month compare and the next-month forecast)
//! and the legacy report routes kept for older clients (summary,
//! by-category, by-day, cashflow).

mod calendar;
mod handlers;
mod queries;

pub use handlers::{
    ReportState, by_category_endpoint, by_day_endpoint, cashflow_endpoint, category_pie_endpoint,
    daily_series_endpoint, forecast_endpoint, mom_compare_endpoint, monthly_series_endpoint,
    summary_cards_endpoint, summary_endpoint,
};
