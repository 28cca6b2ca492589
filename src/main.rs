// src/main.rs
mod activity_log;
mod auth;
mod config;
mod database;
mod dtos; // request/response shapes
mod error;
mod handlers;
mod middleware;
mod models;
mod money;
mod pricing;
mod routes;
mod state;

use tokio::net::TcpListener;
use dotenvy::dotenv;
use std::net::SocketAddr;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return;
        }
    };

    // Create database pool
    let db_pool = match database::create_pool(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create database pool");
            return;
        }
    };

    if let Err(e) = database::run_migrations(&db_pool).await {
        tracing::error!(error = %e, "Failed to run migrations");
        return;
    }

    if let Err(e) = database::bootstrap_admin(&db_pool, &config).await {
        tracing::error!(error = %e, "Failed to create bootstrap admin");
        return;
    }

    let cors = match config.cors_origin.as_deref().map(str::parse::<http::HeaderValue>) {
        Some(Ok(origin)) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_methods(Any)
            .allow_headers(Any),
        Some(Err(e)) => {
            tracing::error!(error = %e, "CORS_ORIGIN is not a valid header value");
            return;
        }
        None => CorsLayer::permissive(),
    };

    let host = config.host;
    let base_port = config.port;

    // Create application state
    let app_state = state::AppState::new(db_pool, config);

    let app = routes::build_app(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Try base_port..base_port+20 to avoid crash when address is in use
    let listener = {
        let mut bound = None;
        for offset in 0u16..=20 {
            let port = base_port.saturating_add(offset);
            let addr = SocketAddr::from((host, port));
            match TcpListener::bind(addr).await {
                Ok(l) => { bound = Some((l, addr)); break; }
                Err(e) => {
                    if offset == 0 { tracing::warn!(%addr, error=%e, "Port in use, trying next"); }
                }
            }
        }
        match bound {
            Some((l, addr)) => {
                tracing::info!("FEMENINE API running on {}", addr);
                l
            }
            None => {
                tracing::error!("Failed to bind to any port starting at {} on {}", base_port, host);
                return;
            }
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error=%e, "Server error");
    }
}
