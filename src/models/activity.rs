use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "activity_action", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityAction {
    Login,
    CreateProduct,
    UpdateProduct,
    DeleteProduct,
    DeactivateProduct,
    ReactivateProduct,
    ViewProduct,
    PrintBarcode,
    RestockProduct,
    AdjustStock,
    CreatePurchase,
    CreateSale,
    CreateUser,
    UpdateUser,
    UpdateConfig,
}

#[derive(Debug, FromRow)]
pub struct ActivityLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub action: ActivityAction,
    pub product_id: Option<i64>,
    pub sku: Option<String>,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}
