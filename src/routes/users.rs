use axum::{Router, routing::{get, patch, post}, middleware};
use crate::state::AppState;
use crate::handlers::user::{create_user, get_me, list_users, login_user, update_user};
use crate::middleware::auth::require_auth;

pub fn routes(state: AppState) -> Router<AppState> {
    let open = Router::new()
        .route("/auth/login", post(login_user));

    let protected = Router::new()
        .route("/auth/me", get(get_me))
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", patch(update_user))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    open.merge(protected)
}
