//! Web front end: upload a document, advance generation one round per
//! click, preview and download the table.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

pub mod error;
pub mod handlers;
pub mod models;
pub mod state;
mod template;
mod upload;

pub use state::AppState;

/// Default maximum upload size.
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;

pub fn router(state: Arc<AppState>, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(handlers::index::index))
        .route("/upload", post(handlers::upload::upload))
        .route("/advance", post(handlers::generate::advance))
        .route("/reset", post(handlers::generate::reset))
        .route("/status", get(handlers::generate::status))
        .route("/toc", get(handlers::generate::toc))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
