use axum::{
    routing::{get, post},
    Router,
};
use crate::state::AppState;
use crate::handlers::sale;
use crate::middleware::auth::require_auth;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/sales", get(sale::list_sales).post(sale::create_sale))
        .route("/sales/quote", post(sale::quote_sale))
        .route("/sales/{id}", get(sale::get_sale))
        .route_layer(axum::middleware::from_fn_with_state(state, require_auth))
}
