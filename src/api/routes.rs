use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::api::handlers::{self, AppState};

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Everything else goes through the live route tables
        .fallback(handlers::dispatch)
        .layer(TraceLayer::new_for_http())
}
