use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "stock_movement_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StockMovementType {
    SaleOut,     // Units sold at the counter
    RestockIn,   // Manual restock
    PurchaseIn,  // Units received on a supplier purchase
    Adjustment,  // Correction, either direction
}

#[derive(Debug, FromRow)]
pub struct StockMovement {
    pub id: i64,
    pub product_id: i64,
    pub movement_type: StockMovementType,
    pub quantity: i32,
    pub reference_id: Option<i64>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
    pub created_by_username: Option<String>,
    pub created_at: DateTime<Utc>,
}
