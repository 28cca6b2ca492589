use axum::{
    routing::{get, put},
    Router,
};
use crate::handlers::catalog;
use crate::middleware::auth::require_auth;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/catalog/brands", get(catalog::list_brands).post(catalog::create_brand))
        .route("/catalog/brands/{id}", put(catalog::update_brand).delete(catalog::delete_brand))
        .route("/catalog/categories", get(catalog::list_categories).post(catalog::create_category))
        .route("/catalog/categories/{id}", put(catalog::update_category).delete(catalog::delete_category))
        .route("/catalog/suppliers", get(catalog::list_suppliers).post(catalog::create_supplier))
        .route("/catalog/suppliers/{id}", put(catalog::update_supplier).delete(catalog::delete_supplier))
        .route_layer(axum::middleware::from_fn_with_state(state, require_auth))
}
