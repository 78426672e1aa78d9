//! Bearer-token authentication.
//!
//! This module covers issuing and validating JWT access tokens, the
//! persisted refresh-token ledger that makes tokens revocable, the guard
//! middleware for protected routes and the account endpoints (register,
//! log in, refresh, me, log out).

mod middleware;
mod refresh;
mod routes;
mod token;

pub use middleware::{AuthState, CurrentUser, auth_guard};
pub use refresh::{
    create_refresh_token_table, delete_refresh_token, delete_user_refresh_tokens,
    refresh_token_exists, store_refresh_token,
};
pub use routes::{
    AccountState, TokenResponse, log_in_endpoint, log_out_endpoint, me_endpoint, refresh_endpoint,
    register_endpoint,
};
pub use token::{DEFAULT_ACCESS_TOKEN_DURATION, decode_token, issue_token};

#[cfg(test)]
pub(crate) use token::Claims;
