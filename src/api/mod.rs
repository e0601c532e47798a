/// API routes and handlers
pub mod account;
pub mod admin;
pub mod health;
pub mod middleware;

use crate::context::AppContext;
use axum::Router;

/// Prefix every account and admin route is mounted under
pub const API_PREFIX: &str = "/api/auth/v1";

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new().nest(
        API_PREFIX,
        Router::new()
            .merge(account::routes())
            .merge(admin::routes()),
    )
}
