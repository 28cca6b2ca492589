use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::models::activity::{ActivityAction, ActivityLog};

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 500;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuery {
    pub user_id: Option<i64>,
    pub action: Option<ActivityAction>,
    pub product_id: Option<i64>,
    pub limit: Option<i64>,
}

impl ActivityQuery {
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogResponse {
    pub id: i64,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub action: ActivityAction,
    pub product_id: Option<i64>,
    pub sku: Option<String>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<ActivityLog> for ActivityLogResponse {
    fn from(log: ActivityLog) -> Self {
        Self {
            id: log.id,
            user_id: log.user_id,
            username: log.username,
            action: log.action,
            product_id: log.product_id,
            sku: log.sku,
            details: log.details,
            created_at: log.created_at,
        }
    }
}
