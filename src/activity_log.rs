// src/activity_log.rs
//! Best-effort audit trail. Writes never fail the request that triggered them.

use sqlx::PgPool;
use crate::models::activity::ActivityAction;

#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub user_id: Option<i64>,
    pub action: ActivityAction,
    pub product_id: Option<i64>,
    pub sku: Option<String>,
    pub details: Option<String>,
}

impl ActivityEntry {
    pub fn new(user_id: Option<i64>, action: ActivityAction) -> Self {
        Self { user_id, action, product_id: None, sku: None, details: None }
    }

    pub fn product(mut self, product_id: i64, sku: impl Into<String>) -> Self {
        self.product_id = Some(product_id);
        self.sku = Some(sku.into());
        self
    }

    /// SKU snapshot without a product reference, for products that no longer exist.
    pub fn sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

pub async fn record(db_pool: &PgPool, entry: ActivityEntry) {
    let result = sqlx::query(
        "INSERT INTO activity_logs (user_id, action, product_id, sku, details)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(entry.user_id)
    .bind(entry.action)
    .bind(entry.product_id)
    .bind(&entry.sku)
    .bind(&entry.details)
    .execute(db_pool)
    .await;

    if let Err(e) = result {
        tracing::warn!(error = %e, action = ?entry.action, "Failed to write activity log");
    }
}
