//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Json, Router, middleware,
    routing::{delete, get, post, put},
};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;

use crate::{
    AppState,
    auth::{
        auth_guard, log_in_endpoint, log_out_endpoint, me_endpoint, refresh_endpoint,
        register_endpoint,
    },
    category::{
        create_category_endpoint, delete_category_endpoint, get_categories_endpoint,
        get_category_endpoint, update_category_endpoint,
    },
    endpoints,
    receipts::parse_receipt_endpoint,
    reports::{
        by_category_endpoint, by_day_endpoint, cashflow_endpoint, category_pie_endpoint,
        daily_series_endpoint, forecast_endpoint, mom_compare_endpoint, monthly_series_endpoint,
        summary_cards_endpoint, summary_endpoint,
    },
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint, get_transaction_endpoint,
        get_transactions_endpoint, update_transaction_endpoint,
    },
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::HEALTH, get(get_health))
        .route(endpoints::REGISTER, post(register_endpoint))
        .route(endpoints::LOG_IN, post(log_in_endpoint))
        .route(endpoints::REFRESH, post(refresh_endpoint));

    let protected_routes = Router::new()
        .route(endpoints::ME, get(me_endpoint))
        .route(endpoints::LOG_OUT, post(log_out_endpoint))
        .route(endpoints::CATEGORIES, get(get_categories_endpoint))
        .route(endpoints::CATEGORIES, post(create_category_endpoint))
        .route(endpoints::CATEGORY, get(get_category_endpoint))
        .route(endpoints::CATEGORY, put(update_category_endpoint))
        .route(endpoints::CATEGORY, delete(delete_category_endpoint))
        .route(endpoints::TRANSACTIONS, get(get_transactions_endpoint))
        .route(endpoints::TRANSACTIONS, post(create_transaction_endpoint))
        .route(endpoints::TRANSACTION, get(get_transaction_endpoint))
        .route(endpoints::TRANSACTION, put(update_transaction_endpoint))
        .route(endpoints::TRANSACTION, delete(delete_transaction_endpoint))
        .route(endpoints::PARSE_RECEIPT, post(parse_receipt_endpoint))
        .route(endpoints::DAILY_SERIES, get(daily_series_endpoint))
        .route(endpoints::MONTHLY_SERIES, get(monthly_series_endpoint))
        .route(endpoints::CATEGORY_PIE, get(category_pie_endpoint))
        .route(endpoints::SUMMARY_CARDS, get(summary_cards_endpoint))
        .route(endpoints::MOM_COMPARE, get(mom_compare_endpoint))
        .route(endpoints::FORECAST, get(forecast_endpoint))
        .route(endpoints::SUMMARY, get(summary_endpoint))
        .route(endpoints::BY_CATEGORY, get(by_category_endpoint))
        .route(endpoints::BY_DAY, get(by_day_endpoint))
        .route(endpoints::CASHFLOW, get(cashflow_endpoint))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    protected_routes
        .merge(unprotected_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Report that the server is up.
async fn get_health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
