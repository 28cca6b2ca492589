use axum::{routing::get, Router};
use crate::state::AppState;
use crate::handlers::config;
use crate::middleware::auth::require_auth;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/config", get(config::list_config).post(config::upsert_config))
        .route("/config/{key}", get(config::get_config).put(config::put_config))
        .route_layer(axum::middleware::from_fn_with_state(state, require_auth))
}
