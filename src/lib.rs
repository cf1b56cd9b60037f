//! Single-node object store with a native JSON API and an S3-compatible
//! API over one storage core.

pub mod app_state;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;

use app_state::AppState;
use axum::Router;

/// Router for both API surfaces with its state attached.
pub fn app(state: AppState) -> Router {
    routes::routes::routes().with_state(state)
}
