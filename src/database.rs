// src/database.rs
use sqlx::postgres::{PgPool, PgPoolOptions};
use crate::config::Config;

pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Creates the first admin account when the users table is empty.
pub async fn bootstrap_admin(pool: &PgPool, config: &Config) -> Result<(), crate::error::AppError> {
    let Some((username, password)) = &config.bootstrap_admin else {
        return Ok(());
    };

    let has_users: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users)")
        .fetch_one(pool)
        .await?;
    if has_users {
        return Ok(());
    }

    let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| crate::error::AppError::internal(format!("Hash error: {e}")))?;

    sqlx::query("INSERT INTO users (username, password_hash, role) VALUES ($1, $2, 'admin')")
        .bind(username.trim())
        .bind(password_hash)
        .execute(pool)
        .await?;

    tracing::info!(%username, "Created bootstrap admin account");
    Ok(())
}
