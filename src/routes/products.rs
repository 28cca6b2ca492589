use axum::{
    routing::{get, patch, post},
    Router,
};
use crate::handlers::product::{
    adjust_stock, create_product, delete_product, get_deletability, get_low_stock_products, get_product,
    get_product_movements, get_products, reactivate_product, record_barcode_print,
    restock_product, update_product,
};
use crate::middleware::auth::require_auth;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/products", get(get_products).post(create_product))
        .route("/products/low-stock", get(get_low_stock_products))
        .route("/products/{id}", get(get_product).put(update_product).delete(delete_product))
        .route("/products/{id}/reactivate", patch(reactivate_product))
        .route("/products/{id}/deletability", get(get_deletability))
        .route("/products/{id}/restock", post(restock_product))
        .route("/products/{id}/adjustments", post(adjust_stock))
        .route("/products/{id}/movements", get(get_product_movements))
        .route("/products/{id}/barcode-prints", post(record_barcode_print))
        .route_layer(axum::middleware::from_fn_with_state(state, require_auth))
}
