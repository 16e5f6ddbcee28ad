//! Liveness endpoint (/)

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::AppState;
use crate::constants::LIVENESS_MESSAGE;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(liveness))
}

async fn liveness() -> &'static str {
    LIVENESS_MESSAGE
}
