pub mod captures;
pub mod health;

use axum::Router;
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::routes())
        .merge(captures::routes())
}
