pub mod activity;
pub mod catalog;
pub mod config;
pub mod products;
pub mod purchases;
pub mod sales;
pub mod users;

use axum::{routing::get, Router};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(users::routes(state.clone()))
        .merge(products::routes(state.clone()))
        .merge(catalog::routes(state.clone()))
        .merge(sales::routes(state.clone()))
        .merge(purchases::routes(state.clone()))
        .merge(activity::routes(state.clone()))
        .merge(config::routes(state))
}

/// Full application: API under /api plus the unauthenticated health check.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api", create_router(state.clone()))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod integration_tests;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use crate::auth::jwt::sign_token;
    use crate::auth::roles::Role;
    use crate::config::Config;

    const SECRET: &str = "test-secret";

    // Lazy pool: only requests rejected before the user lookup can run here.
    fn test_app() -> Router {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://nobody@127.0.0.1:1/none".to_string()),
            "JWT_SECRET" => Some(SECRET.to_string()),
            _ => None,
        })
        .unwrap();
        let pool = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy(&config.database_url)
            .unwrap();
        build_app(AppState::new(pool, config))
    }

    async fn error_code(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        json["code"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_open() {
        let response = test_app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let response = test_app()
            .oneshot(Request::get("/api/products").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(response).await, "unauthorized");
    }

    #[tokio::test]
    async fn token_signed_with_other_secret_is_rejected() {
        let token = sign_token(7, Role::Admin, "mallory", "another-secret").unwrap();
        let response = test_app()
            .oneshot(
                Request::get("/api/auth/me")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_unauthorized() {
        let response = test_app()
            .oneshot(
                Request::get("/api/sales")
                    .header(header::AUTHORIZATION, "Basic b3duZXI6eA==")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(response).await, "unauthorized");
    }
}
