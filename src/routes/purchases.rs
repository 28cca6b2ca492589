use axum::{routing::get, Router};
use crate::state::AppState;
use crate::handlers::purchase::{create_purchase, list_purchases};
use crate::middleware::auth::require_auth;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/purchases", get(list_purchases).post(create_purchase))
        .route_layer(axum::middleware::from_fn_with_state(state, require_auth))
}
