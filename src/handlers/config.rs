use axum::{extract::{Path, State}, Json, Extension};
use sqlx::PgPool;
use tracing::instrument;
use crate::activity_log::{self, ActivityEntry};
use crate::auth::roles::Permission;
use crate::dtos::config::{ConfigEntryRequest, UpdateConfigValueRequest};
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::activity::ActivityAction;
use crate::models::system_config::{
    parse_tax_included, parse_tax_rate, ConfigEntry, TaxDefaults, TAX_INCLUDED_KEY, TAX_RATE_KEY,
};
use crate::state::AppState;

const MAX_KEY_LEN: usize = 128;

/// Reads the store tax settings; any lookup failure falls back to the defaults.
pub async fn load_tax_defaults(db_pool: &PgPool) -> TaxDefaults {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT key, value FROM system_config WHERE key = ANY($1)",
    )
    .bind(vec![TAX_RATE_KEY.to_string(), TAX_INCLUDED_KEY.to_string()])
    .fetch_all(db_pool)
    .await;

    match rows {
        Ok(rows) => {
            let lookup = |key: &str| rows.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
            TaxDefaults::from_values(lookup(TAX_RATE_KEY), lookup(TAX_INCLUDED_KEY))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Could not read tax settings, using defaults");
            TaxDefaults::default()
        }
    }
}

fn validate_key(key: &str) -> Result<&str, AppError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(AppError::validation("Config key is required"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(AppError::validation("Config key is too long"));
    }
    Ok(key)
}

/// Settings that sales read back must parse, or they would be silently ignored later.
fn validate_value(key: &str, value: &str) -> Result<(), AppError> {
    let valid = match key {
        TAX_RATE_KEY => parse_tax_rate(value).is_some(),
        TAX_INCLUDED_KEY => parse_tax_included(value).is_some(),
        _ => true,
    };
    if !valid {
        let expected = if key == TAX_RATE_KEY { "a fraction between 0 and 1, e.g. 0.19" } else { "true or false" };
        return Err(AppError::validation(format!("Invalid value for '{key}': expected {expected}")));
    }
    Ok(())
}

// GET /config
pub async fn list_config(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ConfigEntry>>, AppError> {
    auth.require(Permission::ReadConfig)?;

    let entries = sqlx::query_as::<_, ConfigEntry>(
        "SELECT key, value, description, updated_at FROM system_config ORDER BY key",
    )
    .fetch_all(&db_pool)
    .await?;

    Ok(Json(entries))
}

// POST /config - Upsert many entries in one transaction
#[instrument(skip_all, fields(count = req.len()))]
pub async fn upsert_config(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<Vec<ConfigEntryRequest>>,
) -> Result<Json<Vec<ConfigEntry>>, AppError> {
    auth.require(Permission::WriteConfig)?;

    if req.is_empty() {
        return Err(AppError::validation("At least one config entry is required"));
    }

    let mut tx = db_pool.begin().await?;
    let mut saved = Vec::with_capacity(req.len());

    for entry in &req {
        let key = validate_key(&entry.key)?;
        validate_value(key, &entry.value)?;
        let row = upsert_entry(&mut *tx, key, &entry.value, entry.description.as_deref()).await?;
        saved.push(row);
    }

    tx.commit().await?;

    let keys: Vec<&str> = saved.iter().map(|e| e.key.as_str()).collect();
    activity_log::record(
        &db_pool,
        ActivityEntry::new(Some(auth.user_id), ActivityAction::UpdateConfig)
            .details(format!("Updated: {}", keys.join(", "))),
    )
    .await;

    Ok(Json(saved))
}

// GET /config/:key
pub async fn get_config(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key): Path<String>,
) -> Result<Json<ConfigEntry>, AppError> {
    auth.require(Permission::ReadConfig)?;

    let entry = sqlx::query_as::<_, ConfigEntry>(
        "SELECT key, value, description, updated_at FROM system_config WHERE key = $1",
    )
    .bind(&key)
    .fetch_optional(&db_pool)
    .await?
    .ok_or_else(|| AppError::not_found(format!("Config key '{key}' not found")))?;

    Ok(Json(entry))
}

// PUT /config/:key
#[instrument(skip(db_pool, auth, req))]
pub async fn put_config(
    State(AppState { db_pool, .. }): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(key): Path<String>,
    Json(req): Json<UpdateConfigValueRequest>,
) -> Result<Json<ConfigEntry>, AppError> {
    auth.require(Permission::WriteConfig)?;
    let key = validate_key(&key)?;
    validate_value(key, &req.value)?;

    let entry = upsert_entry(&db_pool, key, &req.value, req.description.as_deref()).await?;

    activity_log::record(
        &db_pool,
        ActivityEntry::new(Some(auth.user_id), ActivityAction::UpdateConfig)
            .details(format!("Updated: {key}")),
    )
    .await;

    Ok(Json(entry))
}

async fn upsert_entry<'e, E>(
    executor: E,
    key: &str,
    value: &str,
    description: Option<&str>,
) -> Result<ConfigEntry, AppError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let entry = sqlx::query_as::<_, ConfigEntry>(
        r#"INSERT INTO system_config (key, value, description)
        VALUES ($1, $2, $3)
        ON CONFLICT (key) DO UPDATE SET
            value = EXCLUDED.value,
            description = COALESCE(EXCLUDED.description, system_config.description),
            updated_at = NOW()
        RETURNING key, value, description, updated_at"#,
    )
    .bind(key)
    .bind(value)
    .bind(description)
    .fetch_one(executor)
    .await?;

    Ok(entry)
}
