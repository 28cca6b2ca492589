use axum::{routing::get, Router};
use crate::state::AppState;
use crate::handlers::activity::list_activity;
use crate::middleware::auth::require_auth;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/activity", get(list_activity))
        .route_layer(axum::middleware::from_fn_with_state(state, require_auth))
}
